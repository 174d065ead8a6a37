// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus serial line server
//!
//! Accepts RTU and ASCII frames on the same line. Each reply uses the
//! framing of its request.

use std::{
    future::{self, Future},
    io,
};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    codec::{serial::SerialFraming, ServerCodec},
    ExceptionCode, Request, Response,
};

use super::{process, ServerOptions, Service, Terminated};

#[derive(Debug)]
pub struct Server<T> {
    transport: T,
    options: ServerOptions,
}

#[cfg(feature = "serial")]
impl Server<tokio_serial::SerialStream> {
    /// Open the serial port at `path` with default line settings.
    pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
        let serial = tokio_serial::SerialStream::open(&tokio_serial::new(path, baud_rate))?;
        Ok(Self::new(serial))
    }
}

impl<T> Server<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Serve requests on an already opened serial line, or on any other
    /// byte stream that carries serial frames.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            options: ServerOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Serve requests until the line is closed.
    pub async fn serve<S>(self, service: S) -> io::Result<Terminated>
    where
        S: Service<Request = Request<'static>, Response = Response, Exception = ExceptionCode>,
    {
        self.serve_until(service, future::pending()).await
    }

    /// Serve requests until the line is closed or `abort_signal` resolves.
    pub async fn serve_until<S, X>(self, service: S, abort_signal: X) -> io::Result<Terminated>
    where
        S: Service<Request = Request<'static>, Response = Response, Exception = ExceptionCode>,
        X: Future<Output = ()>,
    {
        let Self { transport, options } = self;
        let framed = Framed::new(
            transport,
            ServerCodec::new(SerialFraming, options.framing_error_tolerance),
        );
        tokio::select! {
            res = process(framed, service, &options, true) => {
                res?;
                Ok(Terminated::Finished)
            }
            () = abort_signal => {
                log::debug!("Shutdown signal received");
                Ok(Terminated::Aborted)
            }
        }
    }
}
