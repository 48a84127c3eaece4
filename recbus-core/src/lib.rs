//! recbus-core: Typed, named product bus for event-processing pipelines.
//!
//! This crate provides the type-erased slot store, the registry that owns
//! it, the record bus with its naming and storage rules, the flat ntuple
//! tables, and the in-memory column store they persist into.
//!

pub mod bus;
pub mod catalog;
pub mod error;
pub mod header;
pub mod ntuple;
pub mod product;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod slot;
pub mod tree;

pub use bus::{make_key, split_key, RecordBus, SEPARATOR};
pub use catalog::{Catalog, ProductTag};
pub use error::{Error, Result};
pub use header::{EventHeader, RunHeader};
pub use ntuple::NtupleManager;
pub use product::Product;
pub use registry::Registry;
pub use rules::{RuleKind, RuleSet, StorageRule};
pub use schema::{ColumnSchema, ScalarCode};
pub use slot::{Binding, Direction, Slot, TypedSlot};
pub use tree::{Column, ColumnHandle, Tree, TreeId};
