//! Event files: one per-event tree plus the per-run header stream.

use crate::format::{read_document, write_document, Document};
use crate::{Error, Result};
use recbus_core::{Direction, Product, Registry, RunHeader, Tree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Layout and behaviour of event files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFileConfig {
    /// Name of the per-event tree.
    pub event_tree: String,
    /// Name of the per-run tree.
    pub run_tree: String,
    /// Indent JSON output.
    pub pretty: bool,
    /// Rewind inputs instead of ending when they run out of events.
    pub loopable: bool,
}

impl Default for EventFileConfig {
    fn default() -> Self {
        Self {
            event_tree: "Events".to_string(),
            run_tree: "Runs".to_string(),
            pretty: false,
            loopable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Input,
    Output,
}

/// An event file opened for reading or created for writing.
///
/// Output files are written to disk by [`EventFile::close`].
#[derive(Debug)]
pub struct EventFile {
    path: PathBuf,
    config: EventFileConfig,
    mode: Mode,
    events: Option<Tree>,
    runs: BTreeMap<i32, RunHeader>,
}

impl EventFile {
    /// Opens an existing file for reading and imports its run headers.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or its run stream cannot
    /// be decoded.
    pub fn open<P: AsRef<Path>>(path: P, config: EventFileConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut document = read_document(&path)?;
        let events = document.take(&config.event_tree);
        let runs = match document.take(&config.run_tree) {
            Some(tree) => decode_runs(&tree)?,
            None => BTreeMap::new(),
        };
        log::info!(
            "opened '{}': {} events, {} runs",
            path.display(),
            events.as_ref().map_or(0, Tree::entries),
            runs.len()
        );
        Ok(Self {
            path,
            config,
            mode: Mode::Input,
            events,
            runs,
        })
    }

    /// Creates an output file. Nothing touches the disk until
    /// [`EventFile::close`].
    pub fn create<P: AsRef<Path>>(path: P, config: EventFileConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            mode: Mode::Output,
            events: None,
            runs: BTreeMap::new(),
        }
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File configuration.
    #[must_use]
    pub fn config(&self) -> &EventFileConfig {
        &self.config
    }

    /// Returns true for files created for writing.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.mode == Mode::Output
    }

    /// Per-event tree, if present.
    #[must_use]
    pub fn event_tree(&self) -> Option<&Tree> {
        self.events.as_ref()
    }

    /// Hands out the per-event tree.
    ///
    /// # Errors
    /// Returns `NoEventTree` if the file has none.
    pub fn take_event_tree(&mut self) -> Result<Tree> {
        self.events
            .take()
            .ok_or_else(|| Error::NoEventTree(self.path.clone()))
    }

    /// Installs the per-event tree of an output file.
    ///
    /// # Errors
    /// Returns `NotWritable` for input files.
    pub fn set_event_tree(&mut self, tree: Tree) -> Result<()> {
        self.ensure_writable()?;
        self.events = Some(tree);
        Ok(())
    }

    /// Adds a run header to the run stream.
    ///
    /// # Errors
    /// Returns `NotWritable` for input files and `RunExists` if the run
    /// already has a header.
    pub fn write_run_header(&mut self, header: RunHeader) -> Result<()> {
        self.ensure_writable()?;
        let run = header.run_number();
        if self.runs.contains_key(&run) {
            return Err(Error::RunExists(run));
        }
        self.runs.insert(run, header);
        Ok(())
    }

    /// Header of one run.
    ///
    /// # Errors
    /// Returns `MissingRun` if the run has no header.
    pub fn run_header(&self, run: i32) -> Result<&RunHeader> {
        self.runs.get(&run).ok_or(Error::MissingRun(run))
    }

    /// Mutable header of one run.
    ///
    /// # Errors
    /// Returns `MissingRun` if the run has no header.
    pub fn run_header_mut(&mut self, run: i32) -> Result<&mut RunHeader> {
        self.runs.get_mut(&run).ok_or(Error::MissingRun(run))
    }

    /// All run headers ordered by run number.
    pub fn run_headers(&self) -> impl Iterator<Item = &RunHeader> {
        self.runs.values()
    }

    /// Copies run headers of another file that this file does not have yet.
    /// Returns how many were copied.
    ///
    /// # Errors
    /// Returns `NotWritable` for input files.
    pub fn import_run_headers(&mut self, from: &EventFile) -> Result<usize> {
        self.ensure_writable()?;
        let mut copied = 0;
        for header in from.run_headers() {
            if self.runs.contains_key(&header.run_number()) {
                log::debug!(
                    "run {} from '{}' already present",
                    header.run_number(),
                    from.path.display()
                );
                continue;
            }
            self.runs.insert(header.run_number(), header.clone());
            copied += 1;
        }
        Ok(copied)
    }

    /// Closes the file. Output files write the event tree and run stream.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn close(self) -> Result<()> {
        if self.mode == Mode::Input {
            log::debug!("closed '{}'", self.path.display());
            return Ok(());
        }

        let mut document = Document::new();
        let events = self
            .events
            .unwrap_or_else(|| Tree::new(self.config.event_tree.as_str()));
        let entries = events.entries();
        document.insert(renamed(events, &self.config.event_tree));
        document.insert(encode_runs(&self.config.run_tree, self.runs.values())?);
        write_document(&self.path, &document, self.config.pretty)?;

        log::info!(
            "wrote '{}': {} events, {} runs",
            self.path.display(),
            entries,
            self.runs.len()
        );
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            Mode::Output => Ok(()),
            Mode::Input => Err(Error::NotWritable(self.path.clone())),
        }
    }
}

fn renamed(tree: Tree, name: &str) -> Tree {
    if tree.name() == name {
        return tree;
    }
    let columns: Vec<_> = tree.columns().cloned().collect();
    Tree::from_columns(name, tree.entries(), columns).unwrap_or(tree)
}

fn encode_runs<'a>(
    name: &str,
    headers: impl Iterator<Item = &'a RunHeader>,
) -> Result<Tree> {
    let mut tree = Tree::new(name);
    let mut registry = Registry::new();
    registry.board::<RunHeader>(RunHeader::KEY);
    registry.attach(&mut tree, RunHeader::KEY, Direction::Write, true);
    for header in headers {
        registry.update(RunHeader::KEY, header.clone())?;
        registry.store_all(&mut tree)?;
        tree.fill();
    }
    Ok(tree)
}

fn decode_runs(tree: &Tree) -> Result<BTreeMap<i32, RunHeader>> {
    let handle = tree.column(RunHeader::KEY).ok_or_else(|| {
        Error::InvalidFormat(format!("run tree '{}' has no RunHeader column", tree.name()))
    })?;
    let column = tree.column_at(handle).map(|c| c.schema().clone());
    if column != Some(RunHeader::schema()) {
        return Err(Error::InvalidFormat(format!(
            "run tree '{}' holds {:?}, expected {}",
            tree.name(),
            column,
            RunHeader::schema()
        )));
    }

    let mut runs = BTreeMap::new();
    for row in 0..tree.entries() {
        let Some(cell) = tree.cell(handle, row) else {
            continue;
        };
        let header: RunHeader = serde_json::from_value(cell.clone())?;
        runs.insert(header.run_number(), header);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_headers_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.json");

        let mut out = EventFile::create(&path, EventFileConfig::default());
        let mut header = RunHeader::new(7);
        header.set_detector_name("bench");
        out.write_run_header(header).unwrap();
        out.write_run_header(RunHeader::new(3)).unwrap();
        assert!(matches!(
            out.write_run_header(RunHeader::new(7)),
            Err(Error::RunExists(7))
        ));
        out.close().unwrap();

        let input = EventFile::open(&path, EventFileConfig::default()).unwrap();
        assert!(!input.is_output());
        assert_eq!(input.run_header(7).unwrap().detector_name(), "bench");
        let runs: Vec<i32> = input.run_headers().map(RunHeader::run_number).collect();
        assert_eq!(runs, vec![3, 7]);
        assert!(matches!(input.run_header(1), Err(Error::MissingRun(1))));
    }

    #[test]
    fn test_input_is_not_writable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.json");
        EventFile::create(&path, EventFileConfig::default())
            .close()
            .unwrap();

        let mut input = EventFile::open(&path, EventFileConfig::default()).unwrap();
        assert!(matches!(
            input.write_run_header(RunHeader::new(1)),
            Err(Error::NotWritable(_))
        ));
        assert_eq!(input.take_event_tree().unwrap().entries(), 0);
        assert!(matches!(input.take_event_tree(), Err(Error::NoEventTree(_))));
    }

    #[test]
    fn test_import_skips_present_runs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.json");
        let mut first = EventFile::create(&path, EventFileConfig::default());
        first.write_run_header(RunHeader::new(1)).unwrap();
        first.write_run_header(RunHeader::new(2)).unwrap();
        first.close().unwrap();
        let input = EventFile::open(&path, EventFileConfig::default()).unwrap();

        let mut merged = EventFile::create(dir.path().join("m.json"), EventFileConfig::default());
        merged.write_run_header(RunHeader::new(2)).unwrap();
        assert_eq!(merged.import_run_headers(&input).unwrap(), 1);
        assert_eq!(merged.run_headers().count(), 2);
    }

    #[test]
    fn test_custom_tree_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("named.json");
        let config = EventFileConfig {
            event_tree: "LDMX_Events".to_string(),
            run_tree: "LDMX_Run".to_string(),
            ..EventFileConfig::default()
        };
        let mut out = EventFile::create(&path, config.clone());
        let mut tree = Tree::new("scratch");
        tree.fill();
        out.set_event_tree(tree).unwrap();
        out.close().unwrap();

        let document = read_document(&path).unwrap();
        assert!(document.tree("LDMX_Events").is_some());
        assert!(document.tree("LDMX_Run").is_some());
        let input = EventFile::open(&path, config).unwrap();
        assert_eq!(input.event_tree().unwrap().entries(), 1);
    }
}
