// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// Raw station number as carried on the wire.
pub type SlaveId = u8;

/// A single byte for addressing Modbus stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slave(pub SlaveId);

impl Slave {
    /// The special address for sending a broadcast message to all
    /// connected stations at once.
    pub const fn broadcast() -> Self {
        Slave(0)
    }

    /// The station a fresh session talks to unless told otherwise.
    pub const fn default_station() -> Self {
        Slave(1)
    }

    /// The reserved address for a directly connected Modbus TCP device,
    /// i.e. one that is not reached through a TCP/RTU gateway.
    pub const fn tcp_device() -> Self {
        Slave(255)
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::broadcast()
    }
}

impl Default for Slave {
    fn default() -> Self {
        Self::default_station()
    }
}

impl From<SlaveId> for Slave {
    fn from(from: SlaveId) -> Self {
        Slave(from)
    }
}

impl From<Slave> for SlaveId {
    fn from(from: Slave) -> Self {
        from.0
    }
}

impl fmt::Display for Slave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0>2X}", self.0)
    }
}

/// Sessions that carry a default station for requests whose rich-text
/// address has no `s=` parameter.
pub trait SlaveContext {
    /// Select a station for all subsequent outgoing requests.
    fn set_slave(&mut self, slave: Slave);

    /// The currently selected default station.
    fn slave(&self) -> Slave;
}
