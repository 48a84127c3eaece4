//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] recbus_core::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Inconsistent loop or file configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run stream already holds a header for this run.
    #[error("run header for run {0} already exists")]
    RunExists(i32),

    /// No header for this run in the run stream.
    #[error("run header for run {0} not found")]
    MissingRun(i32),

    /// The file has no per-event tree.
    #[error("no event tree in '{}'", .0.display())]
    NoEventTree(PathBuf),

    /// Attempt to write into a file opened for reading.
    #[error("'{}' is not writable", .0.display())]
    NotWritable(PathBuf),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}
