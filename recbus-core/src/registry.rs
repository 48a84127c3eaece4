//! Registry: the name to slot map.
//!
//! The registry exclusively owns every slot. It boards new slots, hands out
//! typed references through a checked downcast, resets all slots at event
//! boundaries, and binds slots to columns of a [`Tree`].

use crate::error::{Error, Result};
use crate::product::Product;
use crate::slot::{Direction, Slot, TypedSlot};
use crate::tree::{ColumnHandle, Tree};
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;

/// Owner of all slots, keyed by internal key.
#[derive(Default)]
pub struct Registry {
    slots: HashMap<String, Box<dyn Slot>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Boards a new slot holding `T` in its reset state.
    ///
    /// An existing slot under the same key is replaced.
    pub fn board<T: Product>(&mut self, key: &str) {
        self.slots
            .insert(key.to_string(), Box::new(TypedSlot::<T>::new()));
    }

    /// Checks whether a slot exists for `key`.
    #[must_use]
    pub fn is_on_board(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Copies `value` into the slot.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if the slot holds another type and
    /// `ProductNotFound` if nothing is boarded under `key`.
    pub fn update<T: Product>(&mut self, key: &str, value: T) -> Result<()> {
        self.typed_mut::<T>(key)?.update(value);
        Ok(())
    }

    /// Returns the current value of the slot.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if the slot holds another type and
    /// `ProductNotFound` if nothing is boarded under `key`.
    pub fn get<T: Product>(&self, key: &str) -> Result<&T> {
        let slot = self.slot(key)?;
        slot.as_any()
            .downcast_ref::<TypedSlot<T>>()
            .map(TypedSlot::get)
            .ok_or_else(|| mismatch::<T>(key, slot))
    }

    /// Returns a mutable reference to the current value.
    ///
    /// The value is not normalized afterwards; use [`Registry::update`] for
    /// replacing whole values.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if the slot holds another type and
    /// `ProductNotFound` if nothing is boarded under `key`.
    pub fn get_mut<T: Product>(&mut self, key: &str) -> Result<&mut T> {
        Ok(self.typed_mut::<T>(key)?.get_mut())
    }

    /// Binds the slot to a column of `target`.
    ///
    /// Rebinds to an existing column; creates the column when absent and
    /// `can_create` is set. Returns `None` if the key is not boarded or no
    /// column could be bound.
    pub fn attach(
        &mut self,
        target: &mut Tree,
        key: &str,
        direction: Direction,
        can_create: bool,
    ) -> Option<ColumnHandle> {
        self.slots
            .get_mut(key)?
            .attach(target, key, direction, can_create)
    }

    /// Drops every binding in one direction.
    pub fn detach_all(&mut self, direction: Direction) {
        for slot in self.slots.values_mut() {
            slot.detach(direction);
        }
    }

    /// Stages every slot bound for writing into `target`.
    ///
    /// # Errors
    /// Returns `Codec` if a value cannot be encoded.
    pub fn store_all(&self, target: &mut Tree) -> Result<()> {
        for (key, slot) in &self.slots {
            slot.store(key, target)?;
        }
        Ok(())
    }

    /// Loads `row` of `target` into every slot bound to it for reading.
    ///
    /// # Errors
    /// Returns `Codec` if a cell cannot be decoded.
    pub fn load_all(&mut self, target: &Tree, row: usize) -> Result<()> {
        for (key, slot) in &mut self.slots {
            slot.load(key, target, row)?;
        }
        Ok(())
    }

    /// Loads `row` of `target` into one slot.
    ///
    /// # Errors
    /// Returns `ProductNotFound` if the key is not boarded and `Codec` if
    /// the cell cannot be decoded.
    pub fn load(&mut self, key: &str, target: &Tree, row: usize) -> Result<bool> {
        let slot = self.slots.get_mut(key).ok_or_else(|| not_found(key))?;
        slot.load(key, target, row)
    }

    /// Resets every boarded slot to its empty state.
    pub fn clear(&mut self) {
        for slot in self.slots.values_mut() {
            slot.reset();
        }
    }

    /// Destroys all slots.
    pub fn everybody_off(&mut self) {
        self.slots.clear();
    }

    /// Destroys one slot. Returns false if nothing was boarded under `key`.
    pub fn take_off(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Keys of all boarded slots, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Type-erased view of one slot.
    #[must_use]
    pub fn slot_ref(&self, key: &str) -> Option<&dyn Slot> {
        self.slots.get(key).map(|slot| &**slot)
    }

    /// Number of boarded slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is boarded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &str) -> Result<&dyn Slot> {
        self.slot_ref(key).ok_or_else(|| not_found(key))
    }

    fn typed_mut<T: Product>(&mut self, key: &str) -> Result<&mut TypedSlot<T>> {
        let slot = self.slots.get_mut(key).ok_or_else(|| not_found(key))?;
        let found = slot.type_name();
        slot.as_any_mut()
            .downcast_mut::<TypedSlot<T>>()
            .ok_or_else(|| Error::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
                found: found.to_string(),
            })
    }
}

fn not_found(key: &str) -> Error {
    Error::ProductNotFound {
        name: key.to_string(),
        pass: String::new(),
    }
}

fn mismatch<T>(key: &str, slot: &dyn Slot) -> Error {
    Error::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
        found: slot.type_name().to_string(),
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in self.keys() {
            writeln!(f, "{key} : {:?}", self.slots[key])?;
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.keys())
            .finish()
    }
}
