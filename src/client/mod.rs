// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus clients

use std::{fmt::Debug, io, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    address::{AddressDefaults, AddressError, RichAddress},
    capability::{Capability, CapabilityCheck},
    command,
    extract::{unpack_bits, unpack_words},
    frame::{Coil, Word},
    slave::{Slave, SlaveContext},
    Error, ExceptionCode, FunctionCode, ProtocolError, Request, Result,
};

pub mod ascii;
pub mod pool;
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "sync")]
pub mod sync;

/// Transport independent asynchronous client trait
#[async_trait]
pub trait Client: Send + Debug {
    /// Send `request` to `slave` and return the payload of the response.
    ///
    /// See [`crate::extract::extract_payload`] for the contents of the payload.
    async fn call(&mut self, slave: Slave, request: Request<'_>) -> Result<Bytes>;

    /// Disconnects the client.
    ///
    /// Permanently disconnects the client by shutting down the
    /// underlying stream in a graceful manner.
    ///
    /// Dropping the client without explicitly disconnecting it
    /// beforehand should also work and free all resources.
    async fn disconnect(&mut self) -> io::Result<()>;
}

/// Asynchronous reads by rich-text address.
#[async_trait]
pub trait Reader {
    /// Read raw register bytes (big endian), 0x03 unless the address
    /// selects another read function.
    async fn read(&mut self, address: &str, quantity: usize) -> Result<Vec<u8>>;

    /// Read registers, 0x03 unless the address selects 0x04.
    async fn read_words(&mut self, address: &str, quantity: usize) -> Result<Vec<Word>>;

    /// Read coils (0x01), discrete inputs (`x=2`) or, for addresses with a
    /// bit index, consecutive bits of registers.
    async fn read_bools(&mut self, address: &str, quantity: usize) -> Result<Vec<Coil>>;

    async fn read_bool(&mut self, address: &str) -> Result<Coil>;
}

/// Asynchronous writes by rich-text address.
#[async_trait]
pub trait Writer {
    /// Write raw register bytes (big endian). The length must be even.
    async fn write(&mut self, address: &str, values: &[u8]) -> Result<()>;

    /// Write registers, 0x10 unless a single word is written through `x=6`.
    async fn write_words(&mut self, address: &str, words: &[Word]) -> Result<()>;

    /// Write a single register, 0x06 unless the address selects 0x10.
    async fn write_word(&mut self, address: &str, word: Word) -> Result<()>;

    /// Write coils, 0x0F unless a single coil is written through `x=5`.
    async fn write_bools(&mut self, address: &str, values: &[Coil]) -> Result<()>;

    /// Write a single coil (0x05) or, for addresses with a bit index, a
    /// single bit of a holding register through a mask write.
    async fn write_bool(&mut self, address: &str, value: Coil) -> Result<()>;

    /// Mask write register (0x16): `(old & and_mask) | or_mask`.
    async fn mask_write(&mut self, address: &str, and_mask: Word, or_mask: Word) -> Result<()>;
}

/// Settings of a [`Context`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Numeric addresses start at 1.
    pub one_based_addressing: bool,

    pub capabilities: CapabilityCheck,

    /// Upper bound for each request/response exchange.
    pub timeout: Option<Duration>,
}

/// Asynchronous Modbus client context
#[derive(Debug)]
pub struct Context {
    client: Box<dyn Client>,
    slave: Slave,
    options: ContextOptions,
}

impl Context {
    pub fn new(client: Box<dyn Client>, slave: Slave) -> Self {
        Self {
            client,
            slave,
            options: ContextOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ContextOptions {
        &mut self.options
    }

    /// Send a raw request to the current slave.
    pub async fn call(&mut self, request: Request<'_>) -> Result<Bytes> {
        self.call_slave(self.slave, request).await
    }

    /// Send a raw request to `slave`.
    pub async fn call_slave(&mut self, slave: Slave, request: Request<'_>) -> Result<Bytes> {
        let call = self.client.call(slave, request);
        match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request timed out"))?,
            None => call.await,
        }
    }

    pub async fn disconnect(&mut self) -> io::Result<()> {
        self.client.disconnect().await
    }

    fn parse(&self, address: &str, function: FunctionCode) -> Result<RichAddress> {
        let defaults = AddressDefaults::new(self.slave, function)
            .one_based(self.options.one_based_addressing);
        Ok(RichAddress::parse(address, &defaults)?)
    }

    /// Read the raw payload of `quantity` items, split into several
    /// requests if entitled.
    async fn read_payload(&mut self, addr: &RichAddress, quantity: usize) -> Result<Vec<u8>> {
        let batching = self
            .options
            .capabilities
            .permits(Capability::ExtendedBatching);
        let requests = command::build_read(addr, quantity, batching)?;
        let cap = command::read_cap(addr.function).map_or(usize::MAX, usize::from);
        let oversized = quantity > cap;
        let mut data = Vec::with_capacity(payload_len(addr.function, quantity));
        for request in requests {
            let expected_len = match &request {
                Request::ReadCoils(_, quantity)
                | Request::ReadDiscreteInputs(_, quantity)
                | Request::ReadHoldingRegisters(_, quantity)
                | Request::ReadInputRegisters(_, quantity) => {
                    payload_len(addr.function, usize::from(*quantity))
                }
                _ => 0,
            };
            let payload = match self.call_slave(addr.station, request).await {
                Ok(payload) => payload,
                Err(err)
                    if oversized
                        && err.exception_code() == Some(ExceptionCode::IllegalDataValue) =>
                {
                    return Err(Error::Capacity {
                        requested: quantity,
                        limit: cap,
                    });
                }
                Err(err) => return Err(err),
            };
            if payload.len() != expected_len {
                return Err(ProtocolError::InvalidResponse(format!(
                    "expected {expected_len} data byte(s), received {}",
                    payload.len()
                ))
                .into());
            }
            data.extend_from_slice(&payload);
        }
        Ok(data)
    }

    async fn write_register_bit(&mut self, addr: &RichAddress, bit: u8, value: Coil) -> Result<()> {
        if !self.options.capabilities.permits(Capability::MaskBitWrite) {
            return Err(Error::NotPermitted(Capability::MaskBitWrite));
        }
        let (and_mask, or_mask) = command::bit_mask(bit, value);
        let request = command::build_mask_write(addr.address, and_mask, or_mask);
        self.call_slave(addr.station, request).await.map(drop)
    }
}

fn payload_len(function: FunctionCode, quantity: usize) -> usize {
    if function.is_bit_access() {
        (quantity + 7) / 8
    } else {
        quantity * 2
    }
}

fn unsupported(function: FunctionCode) -> Error {
    AddressError::UnsupportedFunction { function }.into()
}

fn word_address(addr: &RichAddress, address: &str) -> Result<()> {
    if addr.is_bit_addressed() {
        return Err(Error::InvalidInput(format!(
            "bit index not applicable to register writes: {address}"
        )));
    }
    Ok(())
}

impl SlaveContext for Context {
    fn set_slave(&mut self, slave: Slave) {
        self.slave = slave;
    }

    fn slave(&self) -> Slave {
        self.slave
    }
}

#[async_trait]
impl Reader for Context {
    async fn read(&mut self, address: &str, quantity: usize) -> Result<Vec<u8>> {
        let addr = self.parse(address, FunctionCode::ReadHoldingRegisters)?;
        if addr.is_bit_addressed() {
            return Err(Error::InvalidInput(format!(
                "bit index not applicable to raw reads: {address}"
            )));
        }
        self.read_payload(&addr, quantity).await
    }

    async fn read_words(&mut self, address: &str, quantity: usize) -> Result<Vec<Word>> {
        let addr = self.parse(address, FunctionCode::ReadHoldingRegisters)?;
        if addr.function.is_bit_access() {
            return Err(unsupported(addr.function));
        }
        if addr.is_bit_addressed() {
            return Err(Error::InvalidInput(format!(
                "bit index not applicable to register reads: {address}"
            )));
        }
        let payload = self.read_payload(&addr, quantity).await?;
        Ok(unpack_words(&payload))
    }

    async fn read_bools(&mut self, address: &str, quantity: usize) -> Result<Vec<Coil>> {
        let addr = self.parse(address, FunctionCode::ReadCoils)?;
        let Some(bit) = addr.bit else {
            if !addr.function.is_bit_access() {
                return Err(unsupported(addr.function));
            }
            let payload = self.read_payload(&addr, quantity).await?;
            return Ok(unpack_bits(&payload, quantity));
        };
        let function = match addr.function {
            FunctionCode::ReadInputRegisters => FunctionCode::ReadInputRegisters,
            _ => FunctionCode::ReadHoldingRegisters,
        };
        let words_addr = RichAddress {
            function,
            bit: None,
            ..addr
        };
        let first = usize::from(bit);
        let word_count = (first + quantity + 15) / 16;
        let payload = self.read_payload(&words_addr, word_count).await?;
        let words = unpack_words(&payload);
        Ok((first..first + quantity)
            .map(|i| words.get(i / 16).map_or(false, |w| (w >> (i % 16)) & 1 != 0))
            .collect())
    }

    async fn read_bool(&mut self, address: &str) -> Result<Coil> {
        self.read_bools(address, 1)
            .await?
            .first()
            .copied()
            .ok_or_else(|| ProtocolError::InvalidResponse("no data".to_owned()).into())
    }
}

#[async_trait]
impl Writer for Context {
    async fn write(&mut self, address: &str, values: &[u8]) -> Result<()> {
        if values.len() % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "{} byte(s) do not fill whole registers",
                values.len()
            )));
        }
        let words = unpack_words(values);
        let addr = self.parse(address, FunctionCode::WriteMultipleRegisters)?;
        word_address(&addr, address)?;
        let request = command::build_write_words(&addr, &words)?;
        self.call_slave(addr.station, request).await.map(drop)
    }

    async fn write_words(&mut self, address: &str, words: &[Word]) -> Result<()> {
        let addr = self.parse(address, FunctionCode::WriteMultipleRegisters)?;
        word_address(&addr, address)?;
        let request = command::build_write_words(&addr, words)?;
        self.call_slave(addr.station, request).await.map(drop)
    }

    async fn write_word(&mut self, address: &str, word: Word) -> Result<()> {
        let addr = self.parse(address, FunctionCode::WriteSingleRegister)?;
        word_address(&addr, address)?;
        let words = [word];
        let request = command::build_write_words(&addr, &words)?;
        self.call_slave(addr.station, request).await.map(drop)
    }

    async fn write_bools(&mut self, address: &str, values: &[Coil]) -> Result<()> {
        let addr = self.parse(address, FunctionCode::WriteMultipleCoils)?;
        if let Some(bit) = addr.bit {
            let [value] = values else {
                return Err(Error::InvalidInput(
                    "a register bit address takes exactly one value".to_owned(),
                ));
            };
            return self.write_register_bit(&addr, bit, *value).await;
        }
        let request = command::build_write_bits(&addr, values)?;
        self.call_slave(addr.station, request).await.map(drop)
    }

    async fn write_bool(&mut self, address: &str, value: Coil) -> Result<()> {
        let addr = self.parse(address, FunctionCode::WriteSingleCoil)?;
        if let Some(bit) = addr.bit {
            return self.write_register_bit(&addr, bit, value).await;
        }
        let values = [value];
        let request = command::build_write_bits(&addr, &values)?;
        self.call_slave(addr.station, request).await.map(drop)
    }

    async fn mask_write(&mut self, address: &str, and_mask: Word, or_mask: Word) -> Result<()> {
        let addr = self.parse(address, FunctionCode::MaskWriteRegister)?;
        if addr.function != FunctionCode::MaskWriteRegister {
            return Err(unsupported(addr.function));
        }
        let request = command::build_mask_write(addr.address, and_mask, or_mask);
        self.call_slave(addr.station, request).await.map(drop)
    }
}
