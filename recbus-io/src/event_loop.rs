//! Multi-file event loop.
//!
//! [`EventLoop`] drives a [`RecordBus`] through the supported file
//! topologies:
//!
//! | inputs | outputs | topology                          |
//! |--------|---------|-----------------------------------|
//! | 0      | 1       | production, needs an event limit  |
//! | N      | 0       | analysis                          |
//! | N      | 1       | merge into one output             |
//! | N      | N       | one output per input              |
//!
//! Any topology with an output can additionally split it into a new file
//! from inside the processing callback.

use crate::event_file::{EventFile, EventFileConfig};
use crate::ntuple_file::write_ntuples;
use crate::{Error, Result};
use recbus_core::{EventHeader, NtupleManager, RecordBus, RuleSet, RunHeader, Tree};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Files read in order.
    pub input_files: Vec<PathBuf>,
    /// Files written; empty, one, or one per input.
    pub output_files: Vec<PathBuf>,
    /// Storage rules in the order they are applied.
    pub storage_rules: Vec<String>,
    /// Pass name of products added during this loop.
    pub pass: String,
    /// Run number used in production mode.
    pub run_number: i32,
    /// Stop after this many events.
    pub max_events: Option<u64>,
    /// Where ntuple tables are written at the end, if anywhere.
    pub ntuple_file: Option<PathBuf>,
    /// Layout of event files.
    pub file: EventFileConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            input_files: Vec::new(),
            output_files: Vec::new(),
            storage_rules: Vec::new(),
            pass: "process".to_string(),
            run_number: 0,
            max_events: None,
            ntuple_file: None,
            file: EventFileConfig::default(),
        }
    }
}

/// What the processing callback sees of the current event.
pub struct EventContext<'a> {
    /// The bus holding this event's products.
    pub bus: &'a mut RecordBus,
    /// Ad hoc output tables.
    pub ntuples: &'a mut NtupleManager,
    run: Option<&'a RunHeader>,
    split_to: Option<PathBuf>,
}

impl<'a> EventContext<'a> {
    fn new(
        bus: &'a mut RecordBus,
        ntuples: &'a mut NtupleManager,
        run: Option<&'a RunHeader>,
    ) -> Self {
        Self {
            bus,
            ntuples,
            run,
            split_to: None,
        }
    }

    /// Header of the run this event belongs to, if the run stream has one.
    #[must_use]
    pub fn run_header(&self) -> Option<&RunHeader> {
        self.run
    }

    /// Requests that the output be closed after this event and continued
    /// in a new file at `path`.
    pub fn split_output(&mut self, path: impl Into<PathBuf>) {
        self.split_to = Some(path.into());
    }
}

/// Drives a [`RecordBus`] over input and output files.
pub struct EventLoop {
    config: LoopConfig,
    bus: RecordBus,
    ntuples: NtupleManager,
    processed: u64,
    written: Vec<PathBuf>,
}

impl EventLoop {
    /// Validates the file topology and prepares the bus.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for unsupported input/output combinations and
    /// `Core` if a storage rule does not compile.
    pub fn new(config: LoopConfig) -> Result<Self> {
        let inputs = config.input_files.len();
        let outputs = config.output_files.len();
        if inputs == 0 {
            if outputs == 0 {
                return Err(Error::InvalidConfig(
                    "no input or output files were given".to_string(),
                ));
            }
            if config.max_events.is_none() {
                return Err(Error::InvalidConfig(
                    "producing events without input needs an event limit".to_string(),
                ));
            }
            if outputs > 1 {
                log::warn!(
                    "several output files given with no input files, only '{}' will be used",
                    config.output_files[0].display()
                );
            }
        } else if outputs > 1 && outputs != inputs {
            return Err(Error::InvalidConfig(format!(
                "{inputs} input files cannot be written to {outputs} output files"
            )));
        }
        if config.file.loopable && config.max_events.is_none() {
            log::warn!("loopable input without an event limit, inputs will not be rewound");
        }

        let mut bus = RecordBus::new(config.pass.as_str());
        bus.set_run_number(config.run_number);
        for rule in &config.storage_rules {
            bus.add_drop(rule)?;
        }

        Ok(Self {
            config,
            bus,
            ntuples: NtupleManager::new(),
            processed: 0,
            written: Vec::new(),
        })
    }

    /// Loop configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// The bus events flow through.
    #[must_use]
    pub fn bus(&self) -> &RecordBus {
        &self.bus
    }

    /// Ntuple tables; create tables and variables here before running.
    pub fn ntuples_mut(&mut self) -> &mut NtupleManager {
        &mut self.ntuples
    }

    /// Number of events processed so far.
    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.processed
    }

    /// Files written so far, in the order they were closed.
    #[must_use]
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    /// Runs `process` once per event until the inputs are exhausted or the
    /// event limit is reached. The callback returns whether the event is
    /// kept; only kept events reach the output and the ntuples.
    ///
    /// Returns the number of events processed.
    ///
    /// # Errors
    /// Returns the first error of the callback, the bus or file I/O; the
    /// run stops there.
    pub fn run<F>(&mut self, mut process: F) -> Result<u64>
    where
        F: FnMut(&mut EventContext<'_>) -> Result<bool>,
    {
        if self.config.input_files.is_empty() {
            self.run_production(&mut process)?;
        } else {
            self.run_inputs(&mut process)?;
        }

        if let Some(path) = self.config.ntuple_file.clone() {
            write_ntuples(&path, &self.ntuples, self.config.file.pretty)?;
            self.written.push(path);
        }
        log::info!("processed {} events", self.processed);
        Ok(self.processed)
    }

    fn run_production<F>(&mut self, process: &mut F) -> Result<()>
    where
        F: FnMut(&mut EventContext<'_>) -> Result<bool>,
    {
        let limit = self.config.max_events.unwrap_or(0);
        let run = self.config.run_number;
        let mut out = EventFile::create(&self.config.output_files[0], self.config.file.clone());
        let mut header = RunHeader::new(run);
        header.set_run_start(now().0);
        out.write_run_header(header)?;
        self.bus
            .set_output_tree(Tree::new(self.config.file.event_tree.as_str()));

        while self.processed < limit {
            self.bus.next_event()?;
            let (seconds, nanoseconds) = now();
            self.bus.header_mut()?.set_timestamp(seconds, nanoseconds);

            let mut ctx = EventContext::new(&mut self.bus, &mut self.ntuples, out.run_header(run).ok());
            let keep = process(&mut ctx)?;
            let split = ctx.split_to;

            self.finish_event(keep)?;
            if let Some(next) = split {
                out = self.split_output(out, next)?;
            }
        }

        if let Ok(header) = out.run_header_mut(run) {
            header.set_run_end(now().0);
            log::info!("{header}");
        }
        self.close_output(out)
    }

    fn run_inputs<F>(&mut self, process: &mut F) -> Result<()>
    where
        F: FnMut(&mut EventContext<'_>) -> Result<bool>,
    {
        let single_output = self.config.output_files.len() == 1;
        let has_output = !self.config.output_files.is_empty();
        let inputs = self.config.input_files.clone();
        let mut out: Option<EventFile> = None;
        let mut was_run: Option<i32> = None;

        for (index, path) in inputs.iter().enumerate() {
            log::info!("opening file '{}'", path.display());
            let mut input = EventFile::open(path, self.config.file.clone())?;
            let tree = input.take_event_tree()?;
            let structure = has_output.then(|| {
                output_structure(&tree, self.bus.rules(), &self.config.file.event_tree)
            });
            self.bus.set_input_tree(tree)?;

            if let Some(structure) = structure {
                if let Some(current) = out.as_mut() {
                    // merging into the single output
                    if let Some(existing) = self.bus.take_output_tree() {
                        self.bus.set_output_tree(extend_structure(existing, &structure));
                    }
                    current.import_run_headers(&input)?;
                } else {
                    let target = if single_output { 0 } else { index };
                    let mut file = EventFile::create(
                        &self.config.output_files[target],
                        self.config.file.clone(),
                    );
                    file.import_run_headers(&input)?;
                    self.bus.set_output_tree(structure);
                    out = Some(file);
                }
            }

            let mut limit_reached = false;
            loop {
                if self.limit_reached() {
                    limit_reached = true;
                    break;
                }
                if !self.next_input_event()? {
                    break;
                }

                let run = self.bus.header()?.run();
                if was_run != Some(run) {
                    was_run = Some(run);
                    match input.run_header(run) {
                        Ok(header) => log::info!("got new run header from '{}'\n{header}", path.display()),
                        Err(_) => log::warn!("run header for run {run} was not found"),
                    }
                }

                let mut ctx = EventContext::new(&mut self.bus, &mut self.ntuples, input.run_header(run).ok());
                let keep = process(&mut ctx)?;
                let split = ctx.split_to;

                self.finish_event(keep)?;
                if let Some(next) = split {
                    match out.take() {
                        Some(current) => out = Some(self.split_output(current, next)?),
                        None => log::warn!("output split requested without an output file"),
                    }
                }
            }

            log::info!("closing file '{}'", path.display());
            self.bus.on_end_of_file();
            input.close()?;

            if !single_output {
                if let Some(file) = out.take() {
                    self.close_output(file)?;
                }
            }
            if limit_reached {
                log::info!("reached event limit of {} events", self.processed);
                break;
            }
        }

        if let Some(file) = out.take() {
            self.close_output(file)?;
        }
        Ok(())
    }

    fn next_input_event(&mut self) -> Result<bool> {
        if self.bus.next_event()? {
            return Ok(true);
        }
        if !self.config.file.loopable || self.config.max_events.is_none() {
            return Ok(false);
        }
        log::debug!("input exhausted, rewinding");
        self.bus.rewind_input();
        Ok(self.bus.next_event()?)
    }

    fn limit_reached(&self) -> bool {
        self.config
            .max_events
            .is_some_and(|limit| self.processed >= limit)
    }

    fn finish_event(&mut self, keep: bool) -> Result<()> {
        if keep {
            if self.bus.output_tree().is_some() {
                self.bus.before_fill();
                self.bus.fill()?;
            }
            self.ntuples.fill()?;
        }
        self.ntuples.clear();
        self.bus.clear();
        self.bus.on_end_of_event();
        self.processed += 1;
        Ok(())
    }

    fn split_output(&mut self, mut current: EventFile, next: PathBuf) -> Result<EventFile> {
        let structure = match self.bus.input_tree() {
            Some(input) => output_structure(input, self.bus.rules(), &self.config.file.event_tree),
            None => Tree::new(self.config.file.event_tree.as_str()),
        };
        if let Some(finished) = self.bus.set_output_tree(structure) {
            current.set_event_tree(finished)?;
        }
        let mut file = EventFile::create(&next, self.config.file.clone());
        file.import_run_headers(&current)?;
        log::info!(
            "splitting output '{}' into '{}'",
            current.path().display(),
            next.display()
        );
        let closed = current.path().to_path_buf();
        current.close()?;
        self.written.push(closed);
        Ok(file)
    }

    fn close_output(&mut self, mut file: EventFile) -> Result<()> {
        if let Some(tree) = self.bus.take_output_tree() {
            file.set_event_tree(tree)?;
        }
        let path = file.path().to_path_buf();
        file.close()?;
        self.written.push(path);
        Ok(())
    }
}

/// Empty output tree with the input columns the storage rules let through.
fn output_structure(input: &Tree, rules: &RuleSet, name: &str) -> Tree {
    input.clone_structure(name, |column| {
        column == EventHeader::KEY || rules.writes(column)
    })
}

/// Adds the columns of `structure` that `tree` does not have yet.
fn extend_structure(mut tree: Tree, structure: &Tree) -> Tree {
    for column in structure.columns() {
        if tree.column(column.name()).is_none() {
            log::debug!("merged output gains column '{}'", column.name());
            tree.create_column(column.name(), column.schema().clone());
        }
    }
    tree
}

fn now() -> (i64, u32) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => (
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
            elapsed.subsec_nanos(),
        ),
        Err(_) => (0, 0),
    }
}
