// SPDX-FileCopyrightText: Copyright (c) 2017-2023 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::slave::Slave;

pub type TransactionId = u16;
pub type UnitId = u8;

/// The MBAP header without protocol id and length, which are
/// implied by the framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

impl super::Header for Header {
    fn slave(&self) -> Slave {
        Slave(self.unit_id)
    }
}
