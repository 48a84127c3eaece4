//! On-disk document format.
//!
//! A file holds one [`Document`]: a format version plus every tree keyed by
//! name. JSON files are read through a memory map; HDF5 files (feature
//! `hdf5`) store the same trees as groups.

use crate::{Error, Result};
use memmap2::Mmap;
use recbus_core::Tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Version written into every document.
pub const FORMAT_VERSION: u32 = 1;

/// Storage backend, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Hdf5,
}

impl FileFormat {
    /// `.h5` and `.hdf5` select HDF5, anything else JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("h5" | "hdf5") => Self::Hdf5,
            _ => Self::Json,
        }
    }
}

/// Every tree of one file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Document {
    format_version: u32,
    trees: BTreeMap<String, Tree>,
}

impl Document {
    /// Creates an empty document at the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            trees: BTreeMap::new(),
        }
    }

    /// Format version the document was written with.
    #[must_use]
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Adds a tree under its own name, returning any tree it replaces.
    pub fn insert(&mut self, tree: Tree) -> Option<Tree> {
        self.trees.insert(tree.name().to_string(), tree)
    }

    /// Looks up a tree.
    #[must_use]
    pub fn tree(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    /// Removes a tree from the document.
    pub fn take(&mut self, name: &str) -> Option<Tree> {
        self.trees.remove(name)
    }

    /// All trees keyed by name.
    #[must_use]
    pub fn trees(&self) -> &BTreeMap<String, Tree> {
        &self.trees
    }

    fn check_version(self) -> Result<Self> {
        if self.format_version == 0 || self.format_version > FORMAT_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        Ok(self)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// A memory-mapped file reader.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads a document, picking the backend from the extension.
///
/// # Errors
/// Returns an error if the file cannot be read, is empty or malformed, or
/// was written by a newer format version.
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let document = match FileFormat::from_path(path) {
        FileFormat::Json => {
            let reader = MappedFileReader::open(path)?;
            if reader.is_empty() {
                return Err(Error::InvalidFormat(format!(
                    "'{}' is empty",
                    reader.path().display()
                )));
            }
            serde_json::from_slice::<Document>(reader.as_bytes())?
        }
        FileFormat::Hdf5 => read_hdf5(path)?,
    };
    log::debug!(
        "read '{}' ({} trees)",
        path.display(),
        document.trees.len()
    );
    document.check_version()
}

/// Writes a document, picking the backend from the extension.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_document<P: AsRef<Path>>(path: P, document: &Document, pretty: bool) -> Result<()> {
    let path = path.as_ref();
    match FileFormat::from_path(path) {
        FileFormat::Json => {
            let mut writer = BufWriter::new(File::create(path)?);
            if pretty {
                serde_json::to_writer_pretty(&mut writer, document)?;
            } else {
                serde_json::to_writer(&mut writer, document)?;
            }
            writer.flush()?;
        }
        FileFormat::Hdf5 => write_hdf5(path, document)?,
    }
    log::debug!(
        "wrote '{}' ({} trees)",
        path.display(),
        document.trees.len()
    );
    Ok(())
}

#[cfg(feature = "hdf5")]
fn read_hdf5(path: &Path) -> Result<Document> {
    let mut document = Document::new();
    for tree in crate::hdf5::read_trees(path)? {
        document.insert(tree);
    }
    Ok(document)
}

#[cfg(not(feature = "hdf5"))]
fn read_hdf5(path: &Path) -> Result<Document> {
    Err(Error::InvalidFormat(format!(
        "'{}': HDF5 support not enabled",
        path.display()
    )))
}

#[cfg(feature = "hdf5")]
fn write_hdf5(path: &Path, document: &Document) -> Result<()> {
    crate::hdf5::write_trees(path, document.trees.values())
}

#[cfg(not(feature = "hdf5"))]
fn write_hdf5(path: &Path, _document: &Document) -> Result<()> {
    Err(Error::InvalidFormat(format!(
        "'{}': HDF5 support not enabled",
        path.display()
    )))
}
