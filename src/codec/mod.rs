// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire formats.
//!
//! Every transport implements [`Framing`]: a stateless pair of encode and
//! decode functions plus a completeness predicate over an accumulating
//! receive buffer. Address parsing and command building never depend on
//! the framing, which is injected when a session is constructed.

pub mod ascii;
pub mod rtu;
pub mod serial;
pub mod tcp;

mod framed;

pub use self::framed::{FramedCodec, ServerCodec};

use std::{
    borrow::Cow,
    convert::TryFrom,
    fmt,
    io::{self, Cursor},
};

use byteorder::{BigEndian, ReadBytesExt as _};
use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};

use crate::{
    frame::{tcp::TransactionId, Coil, Header},
    extract::unpack_bits,
    ExceptionResponse, FramingError, FunctionCode, Request, Response, Slave,
};

/// Maximum request PDU size.
///
/// As defined by the protocol for both RTU and TCP.
pub(crate) const MAX_PDU_SIZE: usize = 253;

/// Maximum PDU size accepted by the framings.
///
/// Larger than [`MAX_PDU_SIZE`] because the virtual PLC answers reads of
/// up to 127 registers or 2,040 coils.
pub(crate) const MAX_FRAME_PDU_SIZE: usize = 257;

/// Which side of the conversation decodes the frames.
///
/// RTU frames carry no length field, so the expected length depends on
/// whether a request or a response is being received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receives responses.
    Client,
    /// Receives requests.
    Server,
}

/// A wire format wrapping PDUs into transport frames.
pub trait Framing: fmt::Debug + Default + Clone + Send + Sync + Unpin + 'static {
    type Header: Header;

    /// The header of an outgoing request.
    fn request_header(transaction_id: TransactionId, slave: Slave) -> Self::Header;

    /// Append the frame for `pdu` to `buf`.
    fn encode(&self, hdr: Self::Header, pdu: &[u8], buf: &mut BytesMut);

    /// Length of the frame at the start of `buf`, as soon as it is known.
    ///
    /// `Ok(None)` means more bytes are needed to tell.
    fn frame_len(&self, buf: &[u8], role: Role) -> Result<Option<usize>, FramingError>;

    /// Whether `buf` starts with a complete frame.
    fn is_frame_complete(&self, buf: &[u8], role: Role) -> bool {
        matches!(self.frame_len(buf, role), Ok(Some(len)) if buf.len() >= len)
    }

    /// Unwrap exactly one complete frame.
    fn decode(&self, frame: &[u8]) -> Result<(Self::Header, Bytes), FramingError>;
}

#[allow(clippy::cast_possible_truncation)]
fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

/// Serialize the request PDU (function code followed by data).
pub fn encode_request_pdu(buf: &mut BytesMut, request: &Request<'_>) {
    use crate::frame::Request::*;
    buf.put_u8(request.function_code().value());
    match request {
        ReadCoils(address, quantity)
        | ReadDiscreteInputs(address, quantity)
        | ReadInputRegisters(address, quantity)
        | ReadHoldingRegisters(address, quantity) => {
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        WriteSingleCoil(address, state) => {
            buf.put_u16(*address);
            buf.put_u16(bool_to_coil(*state));
        }
        WriteMultipleCoils(address, coils) => {
            buf.put_u16(*address);
            buf.put_u16(u16_len(coils.len()));
            buf.put_u8(u8_len(packed_coils_size(coils)));
            encode_packed_coils(buf, coils);
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        WriteMultipleRegisters(address, words) => {
            buf.put_u16(*address);
            let len = words.len();
            buf.put_u16(u16_len(len));
            buf.put_u8(u8_len(len * 2));
            for w in words.as_ref() {
                buf.put_u16(*w);
            }
        }
        MaskWriteRegister(address, and_mask, or_mask) => {
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        Custom(_, custom_data) => {
            buf.put_slice(custom_data.as_ref());
        }
    }
}

/// Serialize a successful response PDU.
pub fn encode_response_pdu(buf: &mut BytesMut, response: &Response) {
    use crate::frame::Response::*;
    buf.put_u8(response.function_code().value());
    match response {
        ReadCoils(coils) | ReadDiscreteInputs(coils) => {
            buf.put_u8(u8_len(packed_coils_size(coils)));
            encode_packed_coils(buf, coils);
        }
        ReadInputRegisters(registers) | ReadHoldingRegisters(registers) => {
            buf.put_u8(u8_len(registers.len() * 2));
            for r in registers {
                buf.put_u16(*r);
            }
        }
        WriteSingleCoil(address, state) => {
            buf.put_u16(*address);
            buf.put_u16(bool_to_coil(*state));
        }
        WriteMultipleCoils(address, quantity) | WriteMultipleRegisters(address, quantity) => {
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        MaskWriteRegister(address, and_mask, or_mask) => {
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        Custom(_, custom_data) => {
            buf.put_slice(custom_data);
        }
    }
}

/// Serialize an exception PDU: `(function | 0x80), exception code`.
pub fn encode_exception_response_pdu(buf: &mut BytesMut, rsp: ExceptionResponse) {
    debug_assert!(rsp.function.value() < 0x80);
    buf.put_u8(rsp.function.value() | 0x80);
    buf.put_u8(rsp.exception.into());
}

fn read_u16_be(reader: &mut impl io::Read) -> io::Result<u16> {
    reader.read_u16::<BigEndian>()
}

impl TryFrom<Bytes> for Request<'static> {
    type Error = FramingError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        decode_request_pdu(&bytes).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => FramingError::Truncated(bytes.len()),
            io::ErrorKind::InvalidInput => FramingError::InvalidValue {
                function: FunctionCode::new(bytes.first().copied().unwrap_or_default()),
                message: err.to_string(),
            },
            _ => FramingError::Pdu(err.to_string()),
        })
    }
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

// Well-formed requests with values that must be answered with an exception.
fn invalid_value(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.into())
}

fn decode_request_pdu(bytes: &Bytes) -> io::Result<Request<'static>> {
    use crate::frame::Request::*;
    if bytes.len() > MAX_PDU_SIZE {
        return Err(invalid_data("request PDU size exceeded"));
    }
    let rdr = &mut Cursor::new(bytes);
    let fn_code = rdr.read_u8()?;
    let req = match fn_code {
        0x01 => ReadCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x02 => ReadDiscreteInputs(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x03 => ReadHoldingRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x04 => ReadInputRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x05 => WriteSingleCoil(read_u16_be(rdr)?, coil_to_bool(read_u16_be(rdr)?)?),
        0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
        0x0F => {
            let address = read_u16_be(rdr)?;
            let quantity = read_u16_be(rdr)?;
            let byte_count = usize::from(rdr.read_u8()?);
            if byte_count != (usize::from(quantity) + 7) / 8 {
                return Err(invalid_value("invalid byte count"));
            }
            if bytes.len() < 6 + byte_count {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            rdr.advance(byte_count);
            let packed_coils = &bytes[6..6 + byte_count];
            WriteMultipleCoils(
                address,
                Cow::Owned(unpack_bits(packed_coils, quantity.into())),
            )
        }
        0x10 => {
            let address = read_u16_be(rdr)?;
            let quantity = read_u16_be(rdr)?;
            let byte_count = rdr.read_u8()?;
            if usize::from(byte_count) != usize::from(quantity) * 2 {
                return Err(invalid_value("invalid quantity"));
            }
            let mut data = Vec::with_capacity(quantity.into());
            for _ in 0..quantity {
                data.push(read_u16_be(rdr)?);
            }
            WriteMultipleRegisters(address, Cow::Owned(data))
        }
        0x16 => {
            let address = read_u16_be(rdr)?;
            let and_mask = read_u16_be(rdr)?;
            let or_mask = read_u16_be(rdr)?;
            MaskWriteRegister(address, and_mask, or_mask)
        }
        fn_code if fn_code < 0x80 => {
            // Consume all remaining bytes as custom data.
            return Ok(Custom(fn_code, Cow::Owned(bytes[1..].to_vec())));
        }
        fn_code => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid function code: 0x{fn_code:02X}"),
            ));
        }
    };
    // Verify that all data has been consumed and decoded.
    if rdr.has_remaining() {
        return Err(invalid_data("undecoded request data"));
    }
    Ok(req)
}

pub(crate) fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

fn coil_to_bool(coil: u16) -> io::Result<bool> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(invalid_value(format!("invalid coil value: 0x{coil:04X}"))),
    }
}

pub(crate) fn packed_coils_size(coils: &[Coil]) -> usize {
    (coils.len() + 7) / 8
}

fn encode_packed_coils(buf: &mut BytesMut, coils: &[Coil]) -> usize {
    let packed_coils_size = packed_coils_size(coils);
    let offset = buf.len();
    buf.resize(offset + packed_coils_size, 0);
    let buf = &mut buf[offset..];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b); // 0 or 1
        buf[i / 8] |= v << (i % 8);
    }
    packed_coils_size
}
