// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A virtual PLC backed by a [`DataStore`].
//!
//! Network clients reach the PLC through its [`Service`] implementation.
//! The host application accesses the same data with rich-text addresses
//! and can subscribe to changes of individual holding registers.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use fieldbus_modbus::server::plc::{PlcOptions, VirtualPlc};
//!
//! let plc = VirtualPlc::new(PlcOptions::default());
//! let changes = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&changes);
//! plc.add_subscription("101", move |change| sink.lock().unwrap().push(change))
//!     .unwrap();
//!
//! plc.write("100", &[1, 2, 3]).unwrap();
//! assert_eq!(plc.read("100", 3).unwrap(), vec![1, 2, 3]);
//! assert_eq!(changes.lock().unwrap().len(), 1);
//! ```

use std::{
    fmt, future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    address::{AddressDefaults, AddressError, RichAddress},
    command::bit_mask,
    frame::Address,
    Coil, Error, ExceptionCode, FunctionCode, Request, Response, Result, Slave, Word,
};

use super::{
    store::{BitTable, DataStore, WordTable},
    Service,
};

/// Maximum number of bits per read request.
pub const MAX_READ_BITS: usize = 2040;

/// Maximum number of registers per read request.
pub const MAX_READ_WORDS: usize = 127;

/// Settings of a [`VirtualPlc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlcOptions {
    /// Accept write requests from network clients.
    pub write_enabled: bool,

    /// Rich-text addresses of the host API start at 1.
    pub one_based_addressing: bool,
}

impl Default for PlcOptions {
    fn default() -> Self {
        Self {
            write_enabled: true,
            one_based_addressing: false,
        }
    }
}

/// Identifies a subscription for removal.
pub type SubscriptionId = u64;

/// A holding register that has been changed by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub address: Address,
    pub old_value: Word,
    pub new_value: Word,
}

type Callback = Arc<dyn Fn(Change) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    address: Address,
    last_value: Word,
    callback: Callback,
}

#[derive(Default)]
struct Subscriptions {
    next_id: SubscriptionId,
    entries: Vec<Subscription>,
}

/// Maps read and write requests onto the arenas of a [`DataStore`].
pub struct VirtualPlc {
    store: DataStore,
    options: PlcOptions,
    subscriptions: Mutex<Subscriptions>,
}

impl fmt::Debug for VirtualPlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualPlc")
            .field("options", &self.options)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl Default for VirtualPlc {
    fn default() -> Self {
        Self::new(PlcOptions::default())
    }
}

fn check_read(address: Address, quantity: u16, cap: usize) -> Result<(), ExceptionCode> {
    if usize::from(address) + usize::from(quantity) > super::store::ARENA_SIZE {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    if quantity == 0 || usize::from(quantity) > cap {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(())
}

fn illegal_address(_: AddressError) -> ExceptionCode {
    ExceptionCode::IllegalDataAddress
}

#[allow(clippy::cast_possible_truncation)]
fn quantity(len: usize) -> u16 {
    // Bounded by the address space.
    len as u16
}

impl VirtualPlc {
    #[must_use]
    pub fn new(options: PlcOptions) -> Self {
        Self {
            store: DataStore::new(),
            options,
            subscriptions: Mutex::new(Subscriptions::default()),
        }
    }

    #[must_use]
    pub fn options(&self) -> &PlcOptions {
        &self.options
    }

    #[must_use]
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Dispatch a request of a network client.
    pub fn handle(&self, request: Request<'_>) -> Result<Response, ExceptionCode> {
        use Request::*;

        if !matches!(
            request,
            ReadCoils(..) | ReadDiscreteInputs(..) | ReadHoldingRegisters(..) | ReadInputRegisters(..)
        ) && !self.options.write_enabled
        {
            log::debug!("Rejecting {:?}, writes are disabled", request.function_code());
            return Err(ExceptionCode::IllegalFunction);
        }

        match request {
            ReadCoils(address, qty) => {
                check_read(address, qty, MAX_READ_BITS)?;
                self.store
                    .read_bits(BitTable::Coils, address, qty.into())
                    .map(Response::ReadCoils)
                    .map_err(illegal_address)
            }
            ReadDiscreteInputs(address, qty) => {
                check_read(address, qty, MAX_READ_BITS)?;
                self.store
                    .read_bits(BitTable::DiscreteInputs, address, qty.into())
                    .map(Response::ReadDiscreteInputs)
                    .map_err(illegal_address)
            }
            ReadHoldingRegisters(address, qty) => {
                check_read(address, qty, MAX_READ_WORDS)?;
                self.store
                    .read_words(WordTable::HoldingRegisters, address, qty.into())
                    .map(Response::ReadHoldingRegisters)
                    .map_err(illegal_address)
            }
            ReadInputRegisters(address, qty) => {
                check_read(address, qty, MAX_READ_WORDS)?;
                self.store
                    .read_words(WordTable::InputRegisters, address, qty.into())
                    .map(Response::ReadInputRegisters)
                    .map_err(illegal_address)
            }
            WriteSingleCoil(address, value) => {
                self.store
                    .write_bits(BitTable::Coils, address, &[value])
                    .map_err(illegal_address)?;
                Ok(Response::WriteSingleCoil(address, value))
            }
            WriteMultipleCoils(address, values) => {
                if values.is_empty() {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                self.store
                    .write_bits(BitTable::Coils, address, &values)
                    .map_err(illegal_address)?;
                Ok(Response::WriteMultipleCoils(address, quantity(values.len())))
            }
            WriteSingleRegister(address, value) => {
                self.write_holding(address, &[value])
                    .map_err(illegal_address)?;
                Ok(Response::WriteSingleRegister(address, value))
            }
            WriteMultipleRegisters(address, values) => {
                if values.is_empty() {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                self.write_holding(address, &values)
                    .map_err(illegal_address)?;
                Ok(Response::WriteMultipleRegisters(
                    address,
                    quantity(values.len()),
                ))
            }
            MaskWriteRegister(address, and_mask, or_mask) => {
                self.mask_write_holding(address, and_mask, or_mask);
                Ok(Response::MaskWriteRegister(address, and_mask, or_mask))
            }
            Custom(function, _) => {
                log::debug!("Unsupported function code {function}");
                Err(ExceptionCode::IllegalFunction)
            }
        }
    }

    /// Commit all values, then notify about the registers that changed.
    fn write_holding(
        &self,
        address: Address,
        values: &[Word],
    ) -> std::result::Result<(), AddressError> {
        let old_values = self
            .store
            .write_words(WordTable::HoldingRegisters, address, values)?;
        let new_values =
            self.store
                .read_words(WordTable::HoldingRegisters, address, values.len())?;
        let changes = old_values
            .into_iter()
            .zip(new_values)
            .zip(usize::from(address)..)
            .filter(|((old_value, new_value), _)| old_value != new_value)
            .map(|((old_value, new_value), address)| Change {
                address: quantity(address),
                old_value,
                new_value,
            });
        self.notify(changes);
        Ok(())
    }

    fn mask_write_holding(&self, address: Address, and_mask: Word, or_mask: Word) {
        let (old_value, new_value) =
            self.store
                .mask_write(WordTable::HoldingRegisters, address, and_mask, or_mask);
        if old_value != new_value {
            self.notify(std::iter::once(Change {
                address,
                old_value,
                new_value,
            }));
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Callbacks are invoked after the registry lock has been released,
    /// so they may use the subscription API themselves.
    fn notify(&self, changes: impl Iterator<Item = Change>) {
        let pending: Vec<(Callback, Change)> = {
            let mut subscriptions = self.subscriptions();
            if subscriptions.entries.is_empty() {
                return;
            }
            let mut pending = Vec::new();
            for change in changes {
                for subscription in subscriptions
                    .entries
                    .iter_mut()
                    .filter(|subscription| subscription.address == change.address)
                {
                    subscription.last_value = change.new_value;
                    pending.push((Arc::clone(&subscription.callback), change));
                }
            }
            pending
        };
        for (callback, change) in pending {
            callback(change);
        }
    }

    fn parse(&self, address: &str, function: FunctionCode) -> Result<RichAddress> {
        let defaults = AddressDefaults::new(Slave::default(), function)
            .one_based(self.options.one_based_addressing);
        Ok(RichAddress::parse(address, &defaults)?)
    }

    fn word_table(addr: &RichAddress) -> Result<WordTable> {
        match addr.function {
            FunctionCode::ReadHoldingRegisters
            | FunctionCode::WriteSingleRegister
            | FunctionCode::WriteMultipleRegisters
            | FunctionCode::MaskWriteRegister => Ok(WordTable::HoldingRegisters),
            FunctionCode::ReadInputRegisters => Ok(WordTable::InputRegisters),
            function => Err(AddressError::UnsupportedFunction { function }.into()),
        }
    }

    /// Read registers of the host side.
    ///
    /// Addresses default to holding registers, `x=4` selects input registers.
    pub fn read(&self, address: &str, quantity: usize) -> Result<Vec<Word>> {
        let addr = self.parse(address, FunctionCode::ReadHoldingRegisters)?;
        let table = Self::word_table(&addr)?;
        Ok(self.store.read_words(table, addr.address, quantity)?)
    }

    /// Write registers from the host side.
    ///
    /// Ignores [`PlcOptions::write_enabled`]. Subscribers of holding
    /// registers are notified.
    pub fn write(&self, address: &str, values: &[Word]) -> Result<()> {
        let addr = self.parse(address, FunctionCode::ReadHoldingRegisters)?;
        match Self::word_table(&addr)? {
            WordTable::HoldingRegisters => self.write_holding(addr.address, values)?,
            WordTable::InputRegisters => {
                self.store
                    .write_words(WordTable::InputRegisters, addr.address, values)?;
            }
        }
        Ok(())
    }

    fn read_table_bits(&self, table: BitTable, address: &str, quantity: usize) -> Result<Vec<Coil>> {
        let function = match table {
            BitTable::Coils => FunctionCode::ReadCoils,
            BitTable::DiscreteInputs => FunctionCode::ReadDiscreteInputs,
        };
        let addr = self.parse(address, function)?;
        Ok(self.store.read_bits(table, addr.address, quantity)?)
    }

    fn write_table_bits(&self, table: BitTable, address: &str, values: &[Coil]) -> Result<()> {
        let function = match table {
            BitTable::Coils => FunctionCode::ReadCoils,
            BitTable::DiscreteInputs => FunctionCode::ReadDiscreteInputs,
        };
        let addr = self.parse(address, function)?;
        self.store.write_bits(table, addr.address, values)?;
        Ok(())
    }

    pub fn read_coil(&self, address: &str) -> Result<Coil> {
        Ok(self.read_table_bits(BitTable::Coils, address, 1)?[0])
    }

    pub fn read_coils(&self, address: &str, quantity: usize) -> Result<Vec<Coil>> {
        self.read_table_bits(BitTable::Coils, address, quantity)
    }

    pub fn write_coil(&self, address: &str, value: Coil) -> Result<()> {
        self.write_table_bits(BitTable::Coils, address, &[value])
    }

    pub fn write_coils(&self, address: &str, values: &[Coil]) -> Result<()> {
        self.write_table_bits(BitTable::Coils, address, values)
    }

    pub fn read_discrete(&self, address: &str) -> Result<Coil> {
        Ok(self.read_table_bits(BitTable::DiscreteInputs, address, 1)?[0])
    }

    pub fn read_discretes(&self, address: &str, quantity: usize) -> Result<Vec<Coil>> {
        self.read_table_bits(BitTable::DiscreteInputs, address, quantity)
    }

    pub fn write_discrete(&self, address: &str, value: Coil) -> Result<()> {
        self.write_table_bits(BitTable::DiscreteInputs, address, &[value])
    }

    pub fn write_discretes(&self, address: &str, values: &[Coil]) -> Result<()> {
        self.write_table_bits(BitTable::DiscreteInputs, address, values)
    }

    fn register_bit(&self, address: &str) -> Result<(WordTable, Address, u8)> {
        let addr = self.parse(address, FunctionCode::ReadHoldingRegisters)?;
        let Some(bit) = addr.bit else {
            return Err(Error::InvalidInput(format!(
                "{address:?} does not select a register bit"
            )));
        };
        Ok((Self::word_table(&addr)?, addr.address, bit))
    }

    /// Read a single bit of a register, e.g. `"100.3"`.
    pub fn read_bool(&self, address: &str) -> Result<Coil> {
        let (table, address, bit) = self.register_bit(address)?;
        let word = self.store.read_words(table, address, 1)?[0];
        Ok(word & (1 << bit) != 0)
    }

    /// Set or clear a single bit of a register, e.g. `"100.3"`.
    pub fn write_bool(&self, address: &str, value: Coil) -> Result<()> {
        let (table, address, bit) = self.register_bit(address)?;
        let (and_mask, or_mask) = bit_mask(bit, value);
        match table {
            WordTable::HoldingRegisters => self.mask_write_holding(address, and_mask, or_mask),
            WordTable::InputRegisters => {
                self.store.mask_write(table, address, and_mask, or_mask);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        self.store.save_snapshot()
    }

    /// Restore the arenas. Subscribers are not notified.
    pub fn load_snapshot(&self, blob: &[u8]) -> Result<()> {
        self.store.load_snapshot(blob)
    }

    /// Call `callback` whenever the holding register at `address` changes.
    pub fn add_subscription(
        &self,
        address: &str,
        callback: impl Fn(Change) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        let addr = self.parse(address, FunctionCode::ReadHoldingRegisters)?;
        if Self::word_table(&addr)? != WordTable::HoldingRegisters || addr.bit.is_some() {
            return Err(Error::InvalidInput(format!(
                "{address:?} is not a holding register"
            )));
        }
        let last_value = self
            .store
            .read_words(WordTable::HoldingRegisters, addr.address, 1)?[0];
        let mut subscriptions = self.subscriptions();
        let id = subscriptions.next_id;
        subscriptions.next_id += 1;
        subscriptions.entries.push(Subscription {
            id,
            address: addr.address,
            last_value,
            callback: Arc::new(callback),
        });
        log::debug!("Added subscription {id} for holding register {}", addr.address);
        Ok(id)
    }

    /// Returns `false` if no subscription with this id exists.
    pub fn remove_subscription(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions();
        let count = subscriptions.entries.len();
        subscriptions.entries.retain(|subscription| subscription.id != id);
        subscriptions.entries.len() < count
    }

    pub fn clear_subscriptions(&self) {
        self.subscriptions().entries.clear();
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions().entries.len()
    }

    /// The value of a subscribed register as of the last notification.
    #[must_use]
    pub fn subscribed_value(&self, id: SubscriptionId) -> Option<Word> {
        self.subscriptions()
            .entries
            .iter()
            .find(|subscription| subscription.id == id)
            .map(|subscription| subscription.last_value)
    }
}

impl Service for VirtualPlc {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}
