// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The four data arenas of a virtual PLC.
//!
//! Each cell is accessed atomically on its own. Multi-cell reads and writes
//! are not atomic as a whole: a concurrent reader may observe a partially
//! applied write.

use std::{
    fs,
    ops::Range,
    path::Path,
    sync::atomic::{AtomicBool, AtomicU16, Ordering},
};

use crate::{
    address::AddressError, command::apply_mask, frame::Address, Coil, Error, Result, Word,
};

/// Number of cells per arena.
pub const ARENA_SIZE: usize = 1 << 16;

/// Size of a snapshot blob in bytes.
pub const SNAPSHOT_LEN: usize = 2 * ARENA_SIZE + 2 * 2 * ARENA_SIZE;

/// Single bit arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitTable {
    Coils,
    DiscreteInputs,
}

/// 16-bit register arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordTable {
    HoldingRegisters,
    InputRegisters,
}

fn cell_range(address: Address, quantity: usize) -> std::result::Result<Range<usize>, AddressError> {
    let start = usize::from(address);
    let end = start + quantity;
    if end > ARENA_SIZE {
        return Err(AddressError::OutOfRange { address, quantity });
    }
    Ok(start..end)
}

/// In-memory data of a virtual PLC.
pub struct DataStore {
    coils: Box<[AtomicBool]>,
    discrete_inputs: Box<[AtomicBool]>,
    holding_registers: Box<[AtomicU16]>,
    input_registers: Box<[AtomicU16]>,
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore").finish_non_exhaustive()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    /// All cells cleared.
    #[must_use]
    pub fn new() -> Self {
        fn bits() -> Box<[AtomicBool]> {
            (0..ARENA_SIZE).map(|_| AtomicBool::new(false)).collect()
        }
        fn words() -> Box<[AtomicU16]> {
            (0..ARENA_SIZE).map(|_| AtomicU16::new(0)).collect()
        }
        Self {
            coils: bits(),
            discrete_inputs: bits(),
            holding_registers: words(),
            input_registers: words(),
        }
    }

    fn bits(&self, table: BitTable) -> &[AtomicBool] {
        match table {
            BitTable::Coils => &self.coils,
            BitTable::DiscreteInputs => &self.discrete_inputs,
        }
    }

    fn words(&self, table: WordTable) -> &[AtomicU16] {
        match table {
            WordTable::HoldingRegisters => &self.holding_registers,
            WordTable::InputRegisters => &self.input_registers,
        }
    }

    pub fn read_bits(
        &self,
        table: BitTable,
        address: Address,
        quantity: usize,
    ) -> std::result::Result<Vec<Coil>, AddressError> {
        let range = cell_range(address, quantity)?;
        Ok(self.bits(table)[range]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect())
    }

    /// Write `values` starting at `address` and return the previous values.
    pub fn write_bits(
        &self,
        table: BitTable,
        address: Address,
        values: &[Coil],
    ) -> std::result::Result<Vec<Coil>, AddressError> {
        let range = cell_range(address, values.len())?;
        Ok(self.bits(table)[range]
            .iter()
            .zip(values)
            .map(|(cell, value)| cell.swap(*value, Ordering::Relaxed))
            .collect())
    }

    pub fn read_words(
        &self,
        table: WordTable,
        address: Address,
        quantity: usize,
    ) -> std::result::Result<Vec<Word>, AddressError> {
        let range = cell_range(address, quantity)?;
        Ok(self.words(table)[range]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect())
    }

    /// Write `values` starting at `address` and return the previous values.
    pub fn write_words(
        &self,
        table: WordTable,
        address: Address,
        values: &[Word],
    ) -> std::result::Result<Vec<Word>, AddressError> {
        let range = cell_range(address, values.len())?;
        Ok(self.words(table)[range]
            .iter()
            .zip(values)
            .map(|(cell, value)| cell.swap(*value, Ordering::Relaxed))
            .collect())
    }

    /// Apply `(old & and_mask) | or_mask` to a single register.
    ///
    /// Returns the previous and the new value.
    pub fn mask_write(
        &self,
        table: WordTable,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> (Word, Word) {
        let cell = &self.words(table)[usize::from(address)];
        let old = cell
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |old| {
                Some(apply_mask(old, and_mask, or_mask))
            })
            .unwrap_or_else(|old| old);
        (old, apply_mask(old, and_mask, or_mask))
    }

    /// Serialize all arenas.
    ///
    /// Layout: coils, discrete inputs (one byte per bit), holding registers,
    /// input registers (two big-endian bytes per register).
    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(SNAPSHOT_LEN);
        for table in [BitTable::Coils, BitTable::DiscreteInputs] {
            blob.extend(
                self.bits(table)
                    .iter()
                    .map(|cell| u8::from(cell.load(Ordering::Relaxed))),
            );
        }
        for table in [WordTable::HoldingRegisters, WordTable::InputRegisters] {
            for cell in self.words(table) {
                blob.extend_from_slice(&cell.load(Ordering::Relaxed).to_be_bytes());
            }
        }
        debug_assert_eq!(blob.len(), SNAPSHOT_LEN);
        blob
    }

    /// Restore all arenas from a blob created by [`Self::save_snapshot`].
    pub fn load_snapshot(&self, blob: &[u8]) -> Result<()> {
        if blob.len() != SNAPSHOT_LEN {
            return Err(Error::InvalidInput(format!(
                "snapshot has {} byte(s), expected {SNAPSHOT_LEN}",
                blob.len()
            )));
        }
        let (coils, rest) = blob.split_at(ARENA_SIZE);
        let (discrete_inputs, rest) = rest.split_at(ARENA_SIZE);
        let (holding_registers, input_registers) = rest.split_at(2 * ARENA_SIZE);

        for (table, bytes) in [
            (BitTable::Coils, coils),
            (BitTable::DiscreteInputs, discrete_inputs),
        ] {
            for (cell, byte) in self.bits(table).iter().zip(bytes) {
                cell.store(*byte != 0, Ordering::Relaxed);
            }
        }
        for (table, bytes) in [
            (WordTable::HoldingRegisters, holding_registers),
            (WordTable::InputRegisters, input_registers),
        ] {
            for (cell, pair) in self.words(table).iter().zip(bytes.chunks_exact(2)) {
                cell.store(Word::from_be_bytes([pair[0], pair[1]]), Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn save_snapshot_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.save_snapshot())?;
        log::debug!("Saved snapshot to {}", path.display());
        Ok(())
    }

    pub fn load_snapshot_from(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let blob = fs::read(path)?;
        self.load_snapshot(&blob)?;
        log::debug!("Loaded snapshot from {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_returns_previous_values() {
        let store = DataStore::new();
        let old = store
            .write_words(WordTable::HoldingRegisters, 10, &[1, 2, 3])
            .unwrap();
        assert_eq!(old, vec![0, 0, 0]);
        let old = store
            .write_words(WordTable::HoldingRegisters, 11, &[7, 8])
            .unwrap();
        assert_eq!(old, vec![2, 3]);
        assert_eq!(
            store
                .read_words(WordTable::HoldingRegisters, 10, 3)
                .unwrap(),
            vec![1, 7, 8]
        );
        // Arenas are independent
        assert_eq!(
            store.read_words(WordTable::InputRegisters, 10, 3).unwrap(),
            vec![0, 0, 0]
        );
    }

    #[test]
    fn bits() {
        let store = DataStore::new();
        store
            .write_bits(BitTable::DiscreteInputs, 65_534, &[true, true])
            .unwrap();
        assert_eq!(
            store
                .read_bits(BitTable::DiscreteInputs, 65_533, 3)
                .unwrap(),
            vec![false, true, true]
        );
        assert_eq!(
            store.read_bits(BitTable::Coils, 65_534, 2).unwrap(),
            vec![false, false]
        );
    }

    #[test]
    fn reject_ranges_beyond_address_space() {
        let store = DataStore::new();
        assert!(store
            .read_words(WordTable::HoldingRegisters, 65_535, 1)
            .is_ok());
        assert_eq!(
            store.read_words(WordTable::HoldingRegisters, 65_535, 2),
            Err(AddressError::OutOfRange {
                address: 65_535,
                quantity: 2
            })
        );
        assert!(store
            .write_bits(BitTable::Coils, 65_530, &[true; 7])
            .is_err());
        // Nothing has been written
        assert_eq!(
            store.read_bits(BitTable::Coils, 65_530, 6).unwrap(),
            vec![false; 6]
        );
    }

    #[test]
    fn mask_write_register() {
        let store = DataStore::new();
        store
            .write_words(WordTable::HoldingRegisters, 4, &[0x12])
            .unwrap();
        let (old, new) = store.mask_write(WordTable::HoldingRegisters, 4, 0xF2, 0x25);
        assert_eq!(old, 0x12);
        assert_eq!(new, 0x37);
        assert_eq!(
            store.read_words(WordTable::HoldingRegisters, 4, 1).unwrap(),
            vec![0x37]
        );
    }

    #[test]
    fn snapshot_layout() {
        let store = DataStore::new();
        store.write_bits(BitTable::Coils, 1, &[true]).unwrap();
        store
            .write_bits(BitTable::DiscreteInputs, 2, &[true])
            .unwrap();
        store
            .write_words(WordTable::HoldingRegisters, 3, &[0x1234])
            .unwrap();
        store
            .write_words(WordTable::InputRegisters, 4, &[0xABCD])
            .unwrap();

        let blob = store.save_snapshot();
        assert_eq!(blob.len(), 393_216);
        assert_eq!(blob[1], 1);
        assert_eq!(blob[ARENA_SIZE + 2], 1);
        assert_eq!(&blob[2 * ARENA_SIZE + 6..2 * ARENA_SIZE + 8], &[0x12, 0x34]);
        assert_eq!(&blob[4 * ARENA_SIZE + 8..4 * ARENA_SIZE + 10], &[0xAB, 0xCD]);

        let restored = DataStore::new();
        restored.load_snapshot(&blob).unwrap();
        assert_eq!(restored.save_snapshot(), blob);
        assert_eq!(
            restored
                .read_words(WordTable::InputRegisters, 4, 1)
                .unwrap(),
            vec![0xABCD]
        );
    }

    #[test]
    fn reject_snapshot_of_wrong_size() {
        let store = DataStore::new();
        store
            .write_words(WordTable::HoldingRegisters, 0, &[5])
            .unwrap();
        let err = store.load_snapshot(&[0; 100]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(
            store.read_words(WordTable::HoldingRegisters, 0, 1).unwrap(),
            vec![5]
        );
    }

    #[test]
    fn snapshot_file() {
        let path = std::env::temp_dir().join(format!(
            "fieldbus-modbus-snapshot-{}.bin",
            std::process::id()
        ));
        let store = DataStore::new();
        store
            .write_words(WordTable::HoldingRegisters, 100, &[42])
            .unwrap();
        store.save_snapshot_to(&path).unwrap();

        let restored = DataStore::new();
        restored.load_snapshot_from(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(
            restored
                .read_words(WordTable::HoldingRegisters, 100, 1)
                .unwrap(),
            vec![42]
        );
    }
}
