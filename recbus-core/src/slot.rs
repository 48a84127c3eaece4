//! Type-erased product slots.
//!
//! A [`Slot`] is the uniform face the registry sees: it can reset itself,
//! bind to a column, and move its value to or from that column without the
//! registry knowing the payload type. [`TypedSlot`] is the one generic
//! implementation; typed access goes through a checked downcast.

use crate::error::{Error, Result};
use crate::product::Product;
use crate::schema::ColumnSchema;
use crate::tree::{ColumnHandle, Tree};
use std::any::{type_name, Any};
use std::fmt;

/// Which side of the pipeline a binding serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bound to a column of the input target.
    Read,
    /// Bound to a column of the output target.
    Write,
}

/// Binding state of one slot towards one target.
///
/// `attach` and `detach` are the only transitions; a bound slot must be
/// detached before it can be attached again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Binding {
    #[default]
    Unbound,
    Bound(ColumnHandle),
}

impl Binding {
    /// Column handle, if bound.
    #[must_use]
    pub fn handle(self) -> Option<ColumnHandle> {
        match self {
            Self::Unbound => None,
            Self::Bound(handle) => Some(handle),
        }
    }
}

/// Capabilities every slot provides independent of its payload type.
pub trait Slot: fmt::Debug {
    /// Resets the payload to its type-specific empty state.
    fn reset(&mut self);

    /// Column schema of the payload type.
    fn schema(&self) -> ColumnSchema;

    /// Rust type name of the payload, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Current binding in one direction.
    fn binding(&self, direction: Direction) -> Binding;

    /// Binds to the column `name` of `target`, creating it when absent and
    /// `can_create` is set. Returns `None` when no column could be bound.
    fn attach(
        &mut self,
        target: &mut Tree,
        name: &str,
        direction: Direction,
        can_create: bool,
    ) -> Option<ColumnHandle>;

    /// Drops the binding in one direction.
    fn detach(&mut self, direction: Direction);

    /// Stages the current value into the bound output column.
    ///
    /// Returns false if the slot is not bound to `target` for writing.
    fn store(&self, key: &str, target: &mut Tree) -> Result<bool>;

    /// Loads `row` of the bound input column into the payload.
    ///
    /// Returns false if the slot is not bound to `target` for reading or the
    /// column is disabled.
    fn load(&mut self, key: &str, target: &Tree, row: usize) -> Result<bool>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The generic slot carrying a value of type `T`.
#[derive(Debug)]
pub struct TypedSlot<T: Product> {
    value: T,
    input: Binding,
    output: Binding,
}

impl<T: Product> TypedSlot<T> {
    /// Creates a slot holding `T::default()` reset to its empty state.
    #[must_use]
    pub fn new() -> Self {
        let mut value = T::default();
        value.reset();
        Self {
            value,
            input: Binding::Unbound,
            output: Binding::Unbound,
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutable access to the current value.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Replaces the value and runs the type's normalization.
    pub fn update(&mut self, value: T) {
        self.value = value;
        self.value.normalize();
    }

    fn binding_mut(&mut self, direction: Direction) -> &mut Binding {
        match direction {
            Direction::Read => &mut self.input,
            Direction::Write => &mut self.output,
        }
    }
}

impl<T: Product> Default for TypedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Product> Slot for TypedSlot<T> {
    fn reset(&mut self) {
        self.value.reset();
    }

    fn schema(&self) -> ColumnSchema {
        T::schema()
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn binding(&self, direction: Direction) -> Binding {
        match direction {
            Direction::Read => self.input,
            Direction::Write => self.output,
        }
    }

    fn attach(
        &mut self,
        target: &mut Tree,
        name: &str,
        direction: Direction,
        can_create: bool,
    ) -> Option<ColumnHandle> {
        if let Binding::Bound(previous) = self.binding(direction) {
            log::trace!("{name}: leaving {direction:?} binding {previous:?}");
            self.detach(direction);
        }

        let schema = T::schema();
        let handle = match target.column(name) {
            Some(handle) => {
                let existing = target.column_at(handle)?.schema();
                if *existing != schema {
                    log::warn!(
                        "not binding '{name}': column schema {existing} does not match {schema}"
                    );
                    return None;
                }
                handle
            }
            None if can_create => target.create_column(name, schema),
            None => return None,
        };

        log::trace!("{name}: bound for {direction:?} in tree '{}'", target.name());
        *self.binding_mut(direction) = Binding::Bound(handle);
        Some(handle)
    }

    fn detach(&mut self, direction: Direction) {
        *self.binding_mut(direction) = Binding::Unbound;
    }

    fn store(&self, key: &str, target: &mut Tree) -> Result<bool> {
        let Some(handle) = self.output.handle() else {
            return Ok(false);
        };
        if handle.tree() != target.id() {
            return Ok(false);
        }
        let cell = serde_json::to_value(&self.value).map_err(|source| Error::Codec {
            key: key.to_string(),
            source,
        })?;
        Ok(target.stage(handle, cell))
    }

    fn load(&mut self, key: &str, target: &Tree, row: usize) -> Result<bool> {
        let Some(handle) = self.input.handle() else {
            return Ok(false);
        };
        let Some(cell) = target.cell(handle, row) else {
            return Ok(false);
        };
        if cell.is_null() {
            self.value.reset();
        } else {
            self.value = T::deserialize(cell).map_err(|source| Error::Codec {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
