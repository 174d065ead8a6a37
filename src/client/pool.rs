// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sharing client contexts between tasks.
//!
//! A [`Pool`] lends each context to at most one borrower at a time.
//! Connections are created on demand through a [`NewContext`] factory
//! and returned to the pool when the [`PooledContext`] is dropped. The
//! pool performs no health checks. A broken connection can be dropped
//! with [`PooledContext::discard`].

use std::{
    fmt, io,
    ops::{Deref, DerefMut},
    time::Duration,
};

use async_trait::async_trait;
use bb8::{ManageConnection, PooledConnection, RunError};

use super::Context;

use crate::{Error, Result};

/// How long [`Pool::acquire`] waits for a context by default.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for (re-)creating new contexts on demand.
#[async_trait]
pub trait NewContext: Send + Sync {
    /// Create a new context.
    async fn new_context(&self) -> Result<Context>;
}

/// A pooled context and whether its borrower gave up on it.
#[derive(Debug)]
struct Slot {
    context: Context,
    discarded: bool,
}

struct ContextManager(Box<dyn NewContext>);

#[async_trait]
impl ManageConnection for ContextManager {
    type Connection = Slot;
    type Error = Error;

    async fn connect(&self) -> Result<Slot> {
        let context = self.0.new_context().await?;
        log::debug!("Created pooled context");
        Ok(Slot {
            context,
            discarded: false,
        })
    }

    async fn is_valid(&self, _slot: &mut Slot) -> Result<()> {
        Ok(())
    }

    fn has_broken(&self, slot: &mut Slot) -> bool {
        slot.discarded
    }
}

/// A pool of client contexts.
#[derive(Clone)]
pub struct Pool {
    inner: bb8::Pool<ContextManager>,
    max_size: Option<usize>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("max_size", &self.max_size)
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl Pool {
    /// Create an empty pool that creates up to `max_size` contexts,
    /// or an unbounded number if `None`.
    ///
    /// A `max_size` of zero is treated as one.
    pub fn new(factory: impl NewContext + 'static, max_size: Option<usize>) -> Self {
        Self::with_acquire_timeout(factory, max_size, DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Like [`Pool::new`] with a custom upper bound for [`Pool::acquire`].
    pub fn with_acquire_timeout(
        factory: impl NewContext + 'static,
        max_size: Option<usize>,
        acquire_timeout: Duration,
    ) -> Self {
        let limit = max_size.map_or(u32::MAX, |max_size| {
            u32::try_from(max_size).unwrap_or(u32::MAX).max(1)
        });
        // Contexts are never checked, expired or reaped.
        let inner = bb8::Pool::builder()
            .max_size(limit)
            .min_idle(None)
            .test_on_check_out(false)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(acquire_timeout)
            .build_unchecked(ContextManager(Box::new(factory)));
        Self { inner, max_size }
    }

    /// Borrow an idle context, or create a new one.
    ///
    /// Waits for a context to be returned if the maximum number of
    /// contexts is currently lent out.
    pub async fn acquire(&self) -> Result<PooledContext> {
        let slot = self.inner.get_owned().await.map_err(|err| match err {
            RunError::User(err) => err,
            RunError::TimedOut => Error::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                "no pooled context available",
            )),
        })?;
        Ok(PooledContext(slot))
    }

    #[must_use]
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Number of contexts waiting to be borrowed.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.state().idle_connections as usize
    }

    /// Number of contexts owned by the pool, idle or lent out.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state().connections as usize
    }
}

/// A context borrowed from a [`Pool`].
///
/// Returned to the pool when dropped.
pub struct PooledContext(PooledConnection<'static, ContextManager>);

impl PooledContext {
    /// Drop the context instead of returning it to the pool.
    pub fn discard(mut self) {
        self.0.discarded = true;
    }
}

impl fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledContext").field(&self.0.context).finish()
    }
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.0.context
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.0.context
    }
}
