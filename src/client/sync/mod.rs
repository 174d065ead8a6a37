// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous Modbus context access

#[cfg(feature = "tcp")]
pub mod tcp;

use std::{future::Future, io, time::Duration};

use bytes::Bytes;

use super::{Context as AsyncContext, Reader as AsyncReader, Writer as AsyncWriter};

use crate::{
    frame::{Coil, Word},
    slave::{Slave, SlaveContext},
    Request, Result,
};

fn block_on_with_timeout<T>(
    runtime: &tokio::runtime::Runtime,
    timeout: Option<Duration>,
    task: impl Future<Output = Result<T>>,
) -> Result<T> {
    let task = async {
        let Some(duration) = timeout else {
            return task.await;
        };
        tokio::time::timeout(duration, task)
            .await
            .unwrap_or_else(|elapsed| Err(io::Error::new(io::ErrorKind::TimedOut, elapsed).into()))
    };
    runtime.block_on(task)
}

/// A transport independent synchronous reader trait.
pub trait Reader {
    fn read(&mut self, address: &str, quantity: usize) -> Result<Vec<u8>>;
    fn read_words(&mut self, address: &str, quantity: usize) -> Result<Vec<Word>>;
    fn read_bools(&mut self, address: &str, quantity: usize) -> Result<Vec<Coil>>;
    fn read_bool(&mut self, address: &str) -> Result<Coil>;
}

/// A transport independent synchronous writer trait.
pub trait Writer {
    fn write(&mut self, address: &str, values: &[u8]) -> Result<()>;
    fn write_words(&mut self, address: &str, words: &[Word]) -> Result<()>;
    fn write_word(&mut self, address: &str, word: Word) -> Result<()>;
    fn write_bools(&mut self, address: &str, values: &[Coil]) -> Result<()>;
    fn write_bool(&mut self, address: &str, value: Coil) -> Result<()>;
    fn mask_write(&mut self, address: &str, and_mask: Word, or_mask: Word) -> Result<()>;
}

/// A synchronous Modbus client context.
///
/// Drives an asynchronous [`Context`](super::Context) on a private
/// single-threaded runtime.
#[derive(Debug)]
pub struct Context {
    runtime: tokio::runtime::Runtime,
    async_ctx: AsyncContext,
    timeout: Option<Duration>,
}

impl Context {
    /// Wrap an asynchronous context that has been created on `runtime`.
    pub fn new(runtime: tokio::runtime::Runtime, async_ctx: AsyncContext) -> Self {
        Self {
            runtime,
            async_ctx,
            timeout: None,
        }
    }

    /// Returns the current timeout.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sets a timeout duration for all subsequent operations.
    ///
    /// The timeout is disabled by passing `None`.
    pub fn set_timeout(&mut self, duration: impl Into<Option<Duration>>) {
        self.timeout = duration.into();
    }

    /// Disables the timeout for all subsequent operations.
    pub fn reset_timeout(&mut self) {
        self.timeout = None;
    }

    pub fn call(&mut self, request: Request<'_>) -> Result<Bytes> {
        block_on_with_timeout(&self.runtime, self.timeout, self.async_ctx.call(request))
    }

    pub fn disconnect(&mut self) -> io::Result<()> {
        self.runtime.block_on(self.async_ctx.disconnect())
    }
}

impl SlaveContext for Context {
    fn set_slave(&mut self, slave: Slave) {
        self.async_ctx.set_slave(slave);
    }

    fn slave(&self) -> Slave {
        self.async_ctx.slave()
    }
}

impl Reader for Context {
    fn read(&mut self, address: &str, quantity: usize) -> Result<Vec<u8>> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.read(address, quantity),
        )
    }

    fn read_words(&mut self, address: &str, quantity: usize) -> Result<Vec<Word>> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.read_words(address, quantity),
        )
    }

    fn read_bools(&mut self, address: &str, quantity: usize) -> Result<Vec<Coil>> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.read_bools(address, quantity),
        )
    }

    fn read_bool(&mut self, address: &str) -> Result<Coil> {
        block_on_with_timeout(&self.runtime, self.timeout, self.async_ctx.read_bool(address))
    }
}

impl Writer for Context {
    fn write(&mut self, address: &str, values: &[u8]) -> Result<()> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.write(address, values),
        )
    }

    fn write_words(&mut self, address: &str, words: &[Word]) -> Result<()> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.write_words(address, words),
        )
    }

    fn write_word(&mut self, address: &str, word: Word) -> Result<()> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.write_word(address, word),
        )
    }

    fn write_bools(&mut self, address: &str, values: &[Coil]) -> Result<()> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.write_bools(address, values),
        )
    }

    fn write_bool(&mut self, address: &str, value: Coil) -> Result<()> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.write_bool(address, value),
        )
    }

    fn mask_write(&mut self, address: &str, and_mask: Word, or_mask: Word) -> Result<()> {
        block_on_with_timeout(
            &self.runtime,
            self.timeout,
            self.async_ctx.mask_write(address, and_mask, or_mask),
        )
    }
}
