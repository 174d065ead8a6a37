// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connecting a Modbus ASCII context

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Context;

use crate::{codec::ascii::AsciiFraming, service, slave::Slave};

/// Attach a new client context to a serial line, talking to the
/// default station.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_slave(transport, Slave::default())
}

/// Attach a new client context to a serial line, talking to `slave`
/// unless an address selects another station.
pub fn attach_slave<T>(transport: T, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    let client = service::Client::new(transport, AsciiFraming);
    Context::new(Box::new(client), slave)
}

/// Open a serial port and attach a new client context to it.
#[cfg(feature = "serial")]
pub fn open(builder: &tokio_serial::SerialPortBuilder, slave: Slave) -> std::io::Result<Context> {
    let port = tokio_serial::SerialStream::open(builder)?;
    Ok(attach_slave(port, slave))
}
