// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rich-text addresses.
//!
//! A rich-text address encodes station, function code and data address in
//! a single token:
//!
//! ```text
//! [s=<station>;][x=<function>;]<address>[.<bit>]
//! ```
//!
//! Station and function are decimal numbers. Parameters that are omitted
//! fall back to [`AddressDefaults`]. A trailing `.<bit>` (0-15) selects a
//! single bit of a 16-bit register.
//!
//! ```
//! use fieldbus_modbus::{address::{AddressDefaults, RichAddress}, FunctionCode, Slave};
//!
//! let defaults = AddressDefaults::new(Slave(1), FunctionCode::ReadHoldingRegisters);
//! let addr = RichAddress::parse("s=2;x=4;100", &defaults).unwrap();
//! assert_eq!(addr.station, Slave(2));
//! assert_eq!(addr.function, FunctionCode::ReadInputRegisters);
//! assert_eq!(addr.address, 100);
//! ```

use std::fmt;

use thiserror::Error;

use crate::{frame::Address, FunctionCode, Quantity, Slave};

/// Highest bit index of a 16-bit register.
pub const MAX_BIT_INDEX: u8 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("unknown address parameter: {0:?}")]
    UnknownParameter(String),

    #[error("invalid station: {0:?}")]
    InvalidStation(String),

    #[error("invalid function code: {0:?}")]
    InvalidFunction(String),

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("address 0 is not valid with one-based addressing")]
    ZeroAddress,

    #[error("invalid bit index {0:?}, expected 0-15")]
    InvalidBitIndex(String),

    #[error("function code {function} is not applicable here")]
    UnsupportedFunction { function: FunctionCode },

    #[error("range {address} + {quantity} exceeds the address space")]
    OutOfRange { address: Address, quantity: usize },
}

/// Values used for parameters missing from a rich-text address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDefaults {
    pub station: Slave,
    pub function: FunctionCode,
    /// Numeric addresses start at 1 and are decremented before use.
    pub one_based: bool,
}

impl AddressDefaults {
    #[must_use]
    pub const fn new(station: Slave, function: FunctionCode) -> Self {
        Self {
            station,
            function,
            one_based: false,
        }
    }

    #[must_use]
    pub const fn one_based(mut self, one_based: bool) -> Self {
        self.one_based = one_based;
        self
    }
}

/// A parsed rich-text address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RichAddress {
    pub station: Slave,
    pub function: FunctionCode,
    /// Zero-based protocol address.
    pub address: Address,
    pub bit: Option<u8>,
}

impl RichAddress {
    /// Parse `text`, filling in missing parameters from `defaults`.
    pub fn parse(text: &str, defaults: &AddressDefaults) -> Result<Self, AddressError> {
        let mut station = defaults.station;
        let mut function = defaults.function;

        let mut rest = text.trim();
        if rest.is_empty() {
            return Err(AddressError::Empty);
        }
        while let Some((param, tail)) = rest.split_once(';') {
            let param = param.trim();
            let Some((key, value)) = param.split_once('=') else {
                return Err(AddressError::UnknownParameter(param.to_owned()));
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "s" => {
                    station = value
                        .parse::<u8>()
                        .map(Slave)
                        .map_err(|_| AddressError::InvalidStation(value.to_owned()))?;
                }
                "x" => {
                    function = value
                        .parse::<u8>()
                        .map(FunctionCode::new)
                        .map_err(|_| AddressError::InvalidFunction(value.to_owned()))?;
                }
                _ => return Err(AddressError::UnknownParameter(param.to_owned())),
            }
            rest = tail.trim();
        }

        let (number, bit) = match rest.split_once('.') {
            Some((number, bit)) => (number.trim(), Some(parse_bit_index(bit.trim())?)),
            None => (rest, None),
        };
        if number.is_empty() {
            return Err(AddressError::Empty);
        }
        let raw = number
            .parse::<u32>()
            .map_err(|_| AddressError::InvalidAddress(number.to_owned()))?;
        let raw = if defaults.one_based {
            raw.checked_sub(1).ok_or(AddressError::ZeroAddress)?
        } else {
            raw
        };
        let address =
            Address::try_from(raw).map_err(|_| AddressError::InvalidAddress(number.to_owned()))?;

        Ok(Self {
            station,
            function,
            address,
            bit,
        })
    }

    #[must_use]
    pub const fn is_bit_addressed(&self) -> bool {
        self.bit.is_some()
    }

    /// Verify that `quantity` items starting at this address fit
    /// into the 16-bit address space.
    pub fn check_range(&self, quantity: usize) -> Result<(), AddressError> {
        if usize::from(self.address) + quantity > usize::from(Quantity::MAX) + 1 {
            return Err(AddressError::OutOfRange {
                address: self.address,
                quantity,
            });
        }
        Ok(())
    }
}

fn parse_bit_index(text: &str) -> Result<u8, AddressError> {
    match text.parse::<u8>() {
        Ok(bit) if bit <= MAX_BIT_INDEX => Ok(bit),
        _ => Err(AddressError::InvalidBitIndex(text.to_owned())),
    }
}

/// Formats the zero-based form, which parses back to the same value
/// without one-based addressing.
impl fmt::Display for RichAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={};x={};{}",
            self.station.0,
            self.function.value(),
            self.address
        )?;
        if let Some(bit) = self.bit {
            write!(f, ".{bit}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AddressDefaults {
        AddressDefaults::new(Slave(1), FunctionCode::ReadHoldingRegisters)
    }

    #[test]
    fn parse_station_and_function() {
        let addr = RichAddress::parse("s=2;x=4;100", &defaults()).unwrap();
        assert_eq!(addr.station, Slave(2));
        assert_eq!(addr.function, FunctionCode::ReadInputRegisters);
        assert_eq!(addr.address, 100);
        assert_eq!(addr.bit, None);
    }

    #[test]
    fn parse_one_based() {
        let defaults = defaults().one_based(true);
        let addr = RichAddress::parse("s=2;x=4;100", &defaults).unwrap();
        assert_eq!(addr.address, 99);

        let addr = RichAddress::parse("65536", &defaults).unwrap();
        assert_eq!(addr.address, 65535);

        assert_eq!(
            RichAddress::parse("0", &defaults),
            Err(AddressError::ZeroAddress)
        );
    }

    #[test]
    fn parse_defaults() {
        let addr = RichAddress::parse("100", &defaults()).unwrap();
        assert_eq!(addr.station, Slave(1));
        assert_eq!(addr.function, FunctionCode::ReadHoldingRegisters);
        assert_eq!(addr.address, 100);
    }

    #[test]
    fn parse_bit_index() {
        let addr = RichAddress::parse("100.3", &defaults()).unwrap();
        assert_eq!(addr.address, 100);
        assert_eq!(addr.bit, Some(3));
        assert!(addr.is_bit_addressed());

        let addr = RichAddress::parse("x=3;7.15", &defaults()).unwrap();
        assert_eq!(addr.bit, Some(15));
    }

    #[test]
    fn parameters_in_any_order_and_case() {
        let addr = RichAddress::parse("X=1; S=17; 8", &defaults()).unwrap();
        assert_eq!(addr.station, Slave(17));
        assert_eq!(addr.function, FunctionCode::ReadCoils);
        assert_eq!(addr.address, 8);
    }

    #[test]
    fn reject_malformed_addresses() {
        assert_eq!(RichAddress::parse("", &defaults()), Err(AddressError::Empty));
        assert_eq!(
            RichAddress::parse("s=abc;100", &defaults()),
            Err(AddressError::InvalidStation("abc".into()))
        );
        assert_eq!(
            RichAddress::parse("s=256;100", &defaults()),
            Err(AddressError::InvalidStation("256".into()))
        );
        assert_eq!(
            RichAddress::parse("x=f;100", &defaults()),
            Err(AddressError::InvalidFunction("f".into()))
        );
        assert_eq!(
            RichAddress::parse("D100", &defaults()),
            Err(AddressError::InvalidAddress("D100".into()))
        );
        assert_eq!(
            RichAddress::parse("65536", &defaults()),
            Err(AddressError::InvalidAddress("65536".into()))
        );
        assert_eq!(
            RichAddress::parse("100.16", &defaults()),
            Err(AddressError::InvalidBitIndex("16".into()))
        );
        assert_eq!(
            RichAddress::parse("100.x", &defaults()),
            Err(AddressError::InvalidBitIndex("x".into()))
        );
        assert_eq!(
            RichAddress::parse("t=1;100", &defaults()),
            Err(AddressError::UnknownParameter("t=1".into()))
        );
        assert_eq!(
            RichAddress::parse("s=1;", &defaults()),
            Err(AddressError::Empty)
        );
    }

    #[test]
    fn display_parses_back() {
        let addr = RichAddress::parse("s=9;x=3;1234.7", &defaults()).unwrap();
        let text = addr.to_string();
        assert_eq!(text, "s=9;x=3;1234.7");
        assert_eq!(RichAddress::parse(&text, &defaults()).unwrap(), addr);
    }

    #[test]
    fn range_check() {
        let addr = RichAddress::parse("65530", &defaults()).unwrap();
        assert!(addr.check_range(6).is_ok());
        assert!(addr.check_range(7).is_err());
    }
}
