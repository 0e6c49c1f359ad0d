//! Word-addressed contract storage with Solidity's slot layout.
//!
//! Each contract deployed on the in-process network owns one [`Storage`]: a
//! map from 32-byte slots to 32-byte words, where unset slots read as zero.
//! Typed accessors ([`StorageU256`], [`StorageAddress`], [`StorageMap`]) only
//! describe a slot; reads and writes go through the [`Storage`] passed to
//! them, which lets a program declare its layout as `const` items.
use std::{collections::HashMap, marker::PhantomData};

use alloy::primitives::{keccak256, Address, B256, U256};

/// Storage of a single contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Storage {
    slots: HashMap<B256, B256>,
}

impl Storage {
    /// Reads the word at `slot`. Unset slots are zero.
    #[must_use]
    pub fn load(&self, slot: B256) -> B256 {
        self.slots.get(&slot).copied().unwrap_or_default()
    }

    /// Writes `value` at `slot`. Writing zero clears the slot.
    pub fn store(&mut self, slot: B256, value: B256) {
        if value.is_zero() {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, value);
        }
    }

    /// Number of non-zero slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether every slot is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Value that fits in one storage word.
pub trait Word: Sized {
    /// Encodes the value as a big-endian, left-padded word.
    fn to_word(&self) -> B256;

    /// Decodes the value from a word.
    fn from_word(word: B256) -> Self;
}

impl Word for U256 {
    fn to_word(&self) -> B256 {
        B256::from(*self)
    }

    fn from_word(word: B256) -> Self {
        U256::from_be_bytes(word.0)
    }
}

impl Word for Address {
    fn to_word(&self) -> B256 {
        self.into_word()
    }

    fn from_word(word: B256) -> Self {
        Address::from_word(word)
    }
}

/// A single value of type `T` stored at a fixed slot.
#[derive(Debug)]
pub struct StorageSlot<T> {
    slot: U256,
    value: PhantomData<T>,
}

/// A `uint256` state variable.
pub type StorageU256 = StorageSlot<U256>;
/// An `address` state variable.
pub type StorageAddress = StorageSlot<Address>;

impl<T: Word> StorageSlot<T> {
    /// Describes the variable at `slot`.
    #[must_use]
    pub const fn new(slot: U256) -> Self {
        Self { slot, value: PhantomData }
    }

    /// Reads the variable.
    #[must_use]
    pub fn get(&self, storage: &Storage) -> T {
        T::from_word(storage.load(B256::from(self.slot)))
    }

    /// Writes the variable.
    pub fn set(&self, storage: &mut Storage, value: &T) {
        storage.store(B256::from(self.slot), value.to_word());
    }
}

/// A `mapping(K => V)` state variable rooted at a fixed slot.
#[derive(Debug)]
pub struct StorageMap<K, V> {
    slot: U256,
    entries: PhantomData<(K, V)>,
}

impl<K: Word, V: Word> StorageMap<K, V> {
    /// Describes the mapping rooted at `slot`.
    #[must_use]
    pub const fn new(slot: U256) -> Self {
        Self { slot, entries: PhantomData }
    }

    /// Slot of `self[key]`: `keccak256(pad32(key) ++ pad32(slot))`.
    #[must_use]
    pub fn slot_of(&self, key: &K) -> B256 {
        let mut preimage = [0u8; 64];
        preimage[..32].copy_from_slice(key.to_word().as_slice());
        preimage[32..].copy_from_slice(B256::from(self.slot).as_slice());
        keccak256(preimage)
    }

    /// Reads `self[key]`.
    #[must_use]
    pub fn get(&self, storage: &Storage, key: &K) -> V {
        V::from_word(storage.load(self.slot_of(key)))
    }

    /// Writes `self[key] = value`.
    pub fn set(&self, storage: &mut Storage, key: &K, value: &V) {
        storage.store(self.slot_of(key), value.to_word());
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256, uint, Address, B256, U256};

    use super::{Storage, StorageAddress, StorageMap, StorageU256};

    const SUPPLY: StorageU256 = StorageU256::new(uint!(2_U256));
    const OWNER: StorageAddress = StorageAddress::new(uint!(3_U256));
    const BALANCES: StorageMap<Address, U256> =
        StorageMap::new(uint!(0_U256));

    #[test]
    fn unset_slots_read_as_zero() {
        let storage = Storage::default();
        assert_eq!(SUPPLY.get(&storage), U256::ZERO);
        assert_eq!(OWNER.get(&storage), Address::ZERO);
        assert!(storage.is_empty());
    }

    #[test]
    fn values_round_trip_through_their_slot() {
        let mut storage = Storage::default();
        let owner = address!("A11CEacF9aa32246d767FCCD72e02d6bCbcC375d");

        SUPPLY.set(&mut storage, &uint!(1_000_000_U256));
        OWNER.set(&mut storage, &owner);

        assert_eq!(SUPPLY.get(&storage), uint!(1_000_000_U256));
        assert_eq!(OWNER.get(&storage), owner);
        assert_eq!(
            storage.load(B256::with_last_byte(2)),
            B256::from(uint!(1_000_000_U256))
        );
    }

    #[test]
    fn writing_zero_clears_the_slot() {
        let mut storage = Storage::default();
        SUPPLY.set(&mut storage, &U256::from(7));
        assert_eq!(storage.len(), 1);

        SUPPLY.set(&mut storage, &U256::ZERO);
        assert!(storage.is_empty());
    }

    #[test]
    fn mapping_slots_follow_solidity_layout() {
        // keccak256(abi.encode(address(0), uint256(0)))
        let slot = BALANCES.slot_of(&Address::ZERO);
        assert_eq!(
            slot,
            b256!(
                "ad3228b676f7d3cd4284a5443f17f1962b36e491b30a40b2405849e597ba5fb5"
            )
        );

        let mut storage = Storage::default();
        let alice = address!("A11CEacF9aa32246d767FCCD72e02d6bCbcC375d");
        BALANCES.set(&mut storage, &alice, &U256::from(50));
        assert_eq!(BALANCES.get(&storage, &alice), U256::from(50));
        assert_eq!(BALANCES.get(&storage, &Address::ZERO), U256::ZERO);
    }
}
