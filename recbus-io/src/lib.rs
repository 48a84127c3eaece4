//! recbus-io: Event file persistence for recbus.
//!
//! This crate writes and reads the trees of a record bus, keeps the per-run
//! header stream, and drives the bus over multi-file topologies.
//!

mod error;
pub mod event_file;
pub mod event_loop;
pub mod format;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod ntuple_file;

pub use error::{Error, Result};
pub use event_file::{EventFile, EventFileConfig};
pub use event_loop::{EventContext, EventLoop, LoopConfig};
pub use format::{read_document, write_document, Document, FileFormat, MappedFileReader, FORMAT_VERSION};
pub use ntuple_file::{read_ntuples, write_ntuples};
