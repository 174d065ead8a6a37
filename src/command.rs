// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn parsed addresses and values into request PDUs.

use std::borrow::Cow;

use crate::{
    address::{AddressError, RichAddress},
    frame::{Address, Coil, Word},
    Error, FunctionCode, Quantity, Request, Result,
};

/// Maximum number of bits per read request issued by a client.
pub const MAX_READ_BITS: Quantity = 2000;

/// Maximum number of registers per read request issued by a client.
pub const MAX_READ_WORDS: Quantity = 120;

/// Maximum number of coils per write request.
pub const MAX_WRITE_BITS: usize = 1968;

/// Maximum number of registers per write request.
pub const MAX_WRITE_WORDS: usize = 123;

/// The per-request cap of a read function.
#[must_use]
pub const fn read_cap(function: FunctionCode) -> Option<Quantity> {
    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => Some(MAX_READ_BITS),
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            Some(MAX_READ_WORDS)
        }
        _ => None,
    }
}

/// Split `quantity` items starting at `address` into contiguous chunks
/// of at most `cap` items.
///
/// The range must fit into the address space.
#[must_use]
pub fn split(address: Address, quantity: usize, cap: Quantity) -> Vec<(Address, Quantity)> {
    debug_assert!(cap > 0);
    let cap = usize::from(cap);
    let mut chunks = Vec::with_capacity((quantity + cap - 1) / cap);
    let mut offset = 0;
    while offset < quantity {
        let len = cap.min(quantity - offset);
        #[allow(clippy::cast_possible_truncation)]
        chunks.push(((usize::from(address) + offset) as Address, len as Quantity));
        offset += len;
    }
    chunks
}

fn read_request(function: FunctionCode, address: Address, quantity: Quantity) -> Request<'static> {
    match function {
        FunctionCode::ReadCoils => Request::ReadCoils(address, quantity),
        FunctionCode::ReadDiscreteInputs => Request::ReadDiscreteInputs(address, quantity),
        FunctionCode::ReadInputRegisters => Request::ReadInputRegisters(address, quantity),
        _ => Request::ReadHoldingRegisters(address, quantity),
    }
}

/// Build the read requests for `quantity` items at `addr`.
///
/// Reads beyond the per-request cap are split into several requests if
/// `extended_batching` is permitted. Otherwise a single oversized request
/// is built and left to the device to reject.
pub fn build_read(
    addr: &RichAddress,
    quantity: usize,
    extended_batching: bool,
) -> Result<Vec<Request<'static>>> {
    let Some(cap) = read_cap(addr.function) else {
        return Err(AddressError::UnsupportedFunction {
            function: addr.function,
        }
        .into());
    };
    if quantity == 0 {
        return Err(Error::InvalidInput("nothing to read".to_owned()));
    }
    addr.check_range(quantity)?;
    if extended_batching {
        return Ok(split(addr.address, quantity, cap)
            .into_iter()
            .map(|(address, quantity)| read_request(addr.function, address, quantity))
            .collect());
    }
    let quantity = Quantity::try_from(quantity).map_err(|_| Error::Capacity {
        requested: quantity,
        limit: cap.into(),
    })?;
    Ok(vec![read_request(addr.function, addr.address, quantity)])
}

/// Build a register write.
///
/// A single word uses function 0x06 unless the address selects 0x10.
pub fn build_write_words<'a>(addr: &RichAddress, words: &'a [Word]) -> Result<Request<'a>> {
    if words.is_empty() {
        return Err(Error::InvalidInput("nothing to write".to_owned()));
    }
    addr.check_range(words.len())?;
    match addr.function {
        FunctionCode::WriteSingleRegister if words.len() == 1 => {
            Ok(Request::WriteSingleRegister(addr.address, words[0]))
        }
        FunctionCode::WriteSingleRegister | FunctionCode::WriteMultipleRegisters => {
            if words.len() > MAX_WRITE_WORDS {
                return Err(Error::Capacity {
                    requested: words.len(),
                    limit: MAX_WRITE_WORDS,
                });
            }
            Ok(Request::WriteMultipleRegisters(
                addr.address,
                Cow::Borrowed(words),
            ))
        }
        function => Err(AddressError::UnsupportedFunction { function }.into()),
    }
}

/// Build a coil write.
///
/// A single bit uses function 0x05 unless the address selects 0x0F.
pub fn build_write_bits<'a>(addr: &RichAddress, bits: &'a [Coil]) -> Result<Request<'a>> {
    if bits.is_empty() {
        return Err(Error::InvalidInput("nothing to write".to_owned()));
    }
    addr.check_range(bits.len())?;
    match addr.function {
        FunctionCode::WriteSingleCoil if bits.len() == 1 => {
            Ok(Request::WriteSingleCoil(addr.address, bits[0]))
        }
        FunctionCode::WriteSingleCoil | FunctionCode::WriteMultipleCoils => {
            if bits.len() > MAX_WRITE_BITS {
                return Err(Error::Capacity {
                    requested: bits.len(),
                    limit: MAX_WRITE_BITS,
                });
            }
            Ok(Request::WriteMultipleCoils(addr.address, Cow::Borrowed(bits)))
        }
        function => Err(AddressError::UnsupportedFunction { function }.into()),
    }
}

#[must_use]
pub const fn build_mask_write(address: Address, and_mask: Word, or_mask: Word) -> Request<'static> {
    Request::MaskWriteRegister(address, and_mask, or_mask)
}

/// The `(and_mask, or_mask)` pair that sets or clears a single bit.
#[must_use]
pub const fn bit_mask(bit: u8, value: bool) -> (Word, Word) {
    let mask: Word = 1 << bit;
    if value {
        (!mask, mask)
    } else {
        (!mask, 0)
    }
}

/// The register value after a mask write.
#[must_use]
pub const fn apply_mask(old: Word, and_mask: Word, or_mask: Word) -> Word {
    (old & and_mask) | or_mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{address::AddressDefaults, Slave};

    fn parse(text: &str, function: FunctionCode) -> RichAddress {
        RichAddress::parse(text, &AddressDefaults::new(Slave(1), function)).unwrap()
    }

    #[test]
    fn split_into_capped_chunks() {
        assert_eq!(
            split(0, 300, MAX_READ_WORDS),
            vec![(0, 120), (120, 120), (240, 60)]
        );
        assert_eq!(split(10, 120, MAX_READ_WORDS), vec![(10, 120)]);
        assert_eq!(split(5, 2001, MAX_READ_BITS), vec![(5, 2000), (2005, 1)]);
        assert!(split(0, 0, MAX_READ_WORDS).is_empty());
    }

    #[test]
    fn split_up_to_the_end_of_the_address_space() {
        let chunks = split(65_535 - 239, 240, MAX_READ_WORDS);
        assert_eq!(chunks, vec![(65_296, 120), (65_416, 120)]);
    }

    #[test]
    fn build_split_reads() {
        let addr = parse("x=4;100", FunctionCode::ReadHoldingRegisters);
        let requests = build_read(&addr, 130, true).unwrap();
        assert_eq!(
            requests,
            vec![
                Request::ReadInputRegisters(100, 120),
                Request::ReadInputRegisters(220, 10),
            ]
        );
    }

    #[test]
    fn build_oversized_read_without_batching() {
        let addr = parse("0", FunctionCode::ReadCoils);
        let requests = build_read(&addr, 2500, false).unwrap();
        assert_eq!(requests, vec![Request::ReadCoils(0, 2500)]);
    }

    #[test]
    fn reject_invalid_reads() {
        let addr = parse("x=6;0", FunctionCode::ReadHoldingRegisters);
        assert!(matches!(
            build_read(&addr, 1, true),
            Err(Error::Address(AddressError::UnsupportedFunction { .. }))
        ));

        let addr = parse("65535", FunctionCode::ReadHoldingRegisters);
        assert!(matches!(
            build_read(&addr, 2, true),
            Err(Error::Address(AddressError::OutOfRange { .. }))
        ));
        assert!(matches!(
            build_read(&addr, 0, true),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn build_register_writes() {
        let addr = parse("7", FunctionCode::WriteSingleRegister);
        assert_eq!(
            build_write_words(&addr, &[0xABCD]).unwrap(),
            Request::WriteSingleRegister(7, 0xABCD)
        );
        assert_eq!(
            build_write_words(&addr, &[1, 2]).unwrap(),
            Request::WriteMultipleRegisters(7, Cow::Borrowed(&[1, 2]))
        );

        let addr = parse("x=16;7", FunctionCode::WriteSingleRegister);
        assert_eq!(
            build_write_words(&addr, &[0xABCD]).unwrap(),
            Request::WriteMultipleRegisters(7, Cow::Borrowed(&[0xABCD]))
        );

        let words = vec![0; MAX_WRITE_WORDS + 1];
        assert!(matches!(
            build_write_words(&addr, &words),
            Err(Error::Capacity { limit: 123, .. })
        ));
    }

    #[test]
    fn build_coil_writes() {
        let addr = parse("3", FunctionCode::WriteSingleCoil);
        assert_eq!(
            build_write_bits(&addr, &[true]).unwrap(),
            Request::WriteSingleCoil(3, true)
        );
        assert_eq!(
            build_write_bits(&addr, &[true, false]).unwrap(),
            Request::WriteMultipleCoils(3, Cow::Borrowed(&[true, false]))
        );

        let addr = parse("x=3;3", FunctionCode::WriteSingleCoil);
        assert!(build_write_bits(&addr, &[true]).is_err());
    }

    #[test]
    fn masks_for_single_bits() {
        assert_eq!(bit_mask(0, true), (0xFFFE, 0x0001));
        assert_eq!(bit_mask(3, false), (0xFFF7, 0x0000));
        assert_eq!(bit_mask(15, true), (0x7FFF, 0x8000));

        let (and_mask, or_mask) = bit_mask(4, true);
        assert_eq!(apply_mask(0x0000, and_mask, or_mask), 0x0010);
        let (and_mask, or_mask) = bit_mask(4, false);
        assert_eq!(apply_mask(0xFFFF, and_mask, or_mask), 0xFFEF);
    }

    #[test]
    fn mask_write_formula() {
        assert_eq!(apply_mask(0x0012, 0x00F2, 0x0025), 0x0037);
        assert_eq!(apply_mask(0xFFFF, 0x0000, 0x0000), 0x0000);
        assert_eq!(apply_mask(0x1234, 0xFFFF, 0x0000), 0x1234);
    }
}
