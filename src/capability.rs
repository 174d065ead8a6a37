// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable gate for operations that deployments may want to restrict.
//!
//! The engine consults a single [`CapabilityCheck`] wherever it would
//! split an oversized read into several requests or turn a bit-level
//! boolean write on a register into a mask write. The default permits
//! everything.

use std::{fmt, sync::Arc};

/// Operations guarded by a [`CapabilityCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Split reads exceeding the per-request cap into several requests.
    ExtendedBatching,

    /// Write a single bit of a holding register through a mask write (0x16).
    MaskBitWrite,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtendedBatching => f.write_str("extended batching"),
            Self::MaskBitWrite => f.write_str("bit write through mask write"),
        }
    }
}

/// Shared, thread-safe capability predicate.
#[derive(Clone)]
pub struct CapabilityCheck(Arc<dyn Fn(Capability) -> bool + Send + Sync>);

impl CapabilityCheck {
    pub fn new(check: impl Fn(Capability) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(check))
    }

    /// Permits every capability.
    #[must_use]
    pub fn permissive() -> Self {
        Self::new(|_| true)
    }

    /// Denies every capability.
    #[must_use]
    pub fn deny_all() -> Self {
        Self::new(|_| false)
    }

    #[must_use]
    pub fn permits(&self, capability: Capability) -> bool {
        (self.0)(capability)
    }
}

impl Default for CapabilityCheck {
    fn default() -> Self {
        Self::permissive()
    }
}

impl fmt::Debug for CapabilityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityCheck")
            .field("extended_batching", &self.permits(Capability::ExtendedBatching))
            .field("mask_bit_write", &self.permits(Capability::MaskBitWrite))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_permissive() {
        let check = CapabilityCheck::default();
        assert!(check.permits(Capability::ExtendedBatching));
        assert!(check.permits(Capability::MaskBitWrite));
    }

    #[test]
    fn selective_check() {
        let check = CapabilityCheck::new(|cap| cap == Capability::MaskBitWrite);
        assert!(!check.permits(Capability::ExtendedBatching));
        assert!(check.permits(Capability::MaskBitWrite));
        assert!(!CapabilityCheck::deny_all().permits(Capability::MaskBitWrite));
    }
}
