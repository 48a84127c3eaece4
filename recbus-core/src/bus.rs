//! The record bus: named products flowing between pipeline stages.
//!
//! [`RecordBus`] layers product naming, storage rules, ambiguous-name
//! resolution and the input/output target lifecycle on top of a
//! [`Registry`]. Within one event the bus moves through
//!
//! ```text
//! idle --next_event--> row loaded --add*--> before_fill/fill --clear--> idle
//! ```
//!
//! and every product identity may be written at most once per event.

use crate::catalog::{Catalog, ProductTag};
use crate::error::{Error, Result};
use crate::header::EventHeader;
use crate::product::Product;
use crate::registry::Registry;
use crate::rules::RuleSet;
use crate::slot::{Binding, Direction};
use crate::tree::Tree;
use std::any::type_name;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Character separating product name and pass in an internal key.
pub const SEPARATOR: char = '_';

/// Builds the internal key of a product.
///
/// The event header is stored under its name verbatim.
#[must_use]
pub fn make_key(name: &str, pass: &str) -> String {
    if name == EventHeader::KEY {
        name.to_string()
    } else {
        format!("{name}{SEPARATOR}{pass}")
    }
}

/// Splits an internal key into (name, pass). The header key yields an empty
/// pass; keys without a separator yield `None`.
#[must_use]
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    if key == EventHeader::KEY {
        return Some((key, ""));
    }
    key.split_once(SEPARATOR)
}

/// Typed, named product store for one event at a time.
pub struct RecordBus {
    pass: String,
    run_number: i32,
    registry: Registry,
    produced: Catalog,
    catalog: Catalog,
    rules: RuleSet,
    filled: HashSet<String>,
    known_lookups: HashMap<String, String>,
    input: Option<Tree>,
    output: Option<Tree>,
    events_started: u64,
}

impl RecordBus {
    /// Creates a bus whose products are written under `pass`.
    pub fn new(pass: impl Into<String>) -> Self {
        let mut registry = Registry::new();
        registry.board::<EventHeader>(EventHeader::KEY);
        let mut produced = Catalog::new();
        produced.record(ProductTag::new(
            EventHeader::KEY,
            "",
            EventHeader::schema().type_name(),
        ));
        Self {
            pass: pass.into(),
            run_number: 0,
            registry,
            catalog: produced.clone(),
            produced,
            rules: RuleSet::new(),
            filled: HashSet::new(),
            known_lookups: HashMap::new(),
            input: None,
            output: None,
            events_started: 0,
        }
    }

    /// Pass new products are written under.
    #[must_use]
    pub fn pass_name(&self) -> &str {
        &self.pass
    }

    /// Changes the pass used by subsequent [`RecordBus::add`] calls.
    pub fn set_pass_name(&mut self, pass: impl Into<String>) {
        self.pass = pass.into();
    }

    /// Run number stamped on headers in production mode.
    pub fn set_run_number(&mut self, run: i32) {
        self.run_number = run;
    }

    /// Adds a product for this event under the current pass.
    ///
    /// # Errors
    /// - `IllegalName` if `name` contains [`SEPARATOR`]
    /// - `ProductExists` if the product was already written this event
    /// - `TypeMismatch` if the key was boarded with another type
    pub fn add<T: Product>(&mut self, name: &str, value: T) -> Result<()> {
        if name.contains(SEPARATOR) {
            return Err(Error::IllegalName {
                name: name.to_string(),
            });
        }

        let is_header = name == EventHeader::KEY;
        let key = make_key(name, &self.pass);
        if self.filled.contains(&key) {
            return Err(Error::ProductExists { key });
        }

        if !self.registry.is_on_board(&key) {
            self.registry.board::<T>(&key);
            if let Some(output) = self.output.as_mut() {
                if is_header || self.rules.writes(&key) {
                    self.registry
                        .attach(output, &key, Direction::Write, true);
                } else {
                    log::debug!("{key}: dropped from output by storage rules");
                }
            }
            let pass = if is_header { "" } else { self.pass.as_str() };
            let tag = ProductTag::new(name, pass, T::schema().type_name());
            self.produced.record(tag.clone());
            if self.catalog.record(tag) {
                self.known_lookups.clear();
            }
        }

        self.registry.update(&key, value)?;
        self.filled.insert(key);
        Ok(())
    }

    /// Returns a product of this event.
    ///
    /// With an empty `pass` the name is resolved against the catalog and
    /// must match exactly one pass. Products not yet on board are loaded
    /// lazily from the current row of the input target.
    ///
    /// # Errors
    /// - `ProductNotFound` if nothing matches, the input has no such column
    ///   or no row has been loaded yet
    /// - `ProductAmbiguous` if several passes match an empty `pass`
    /// - `TypeMismatch` if `T` disagrees with the slot or input column
    pub fn get<T: Product>(&mut self, name: &str, pass: &str) -> Result<&T> {
        let key = self.resolve_key(name, pass)?;

        if !self.registry.is_on_board(&key) {
            self.load_from_input::<T>(name, pass, &key)?;
        }
        self.registry.get::<T>(&key)
    }

    /// True if exactly one catalog entry matches name and pass exactly.
    ///
    /// # Errors
    /// Returns `InvalidRegex` if either pattern does not compile.
    pub fn exists(&self, name: &str, pass: &str) -> Result<bool> {
        Ok(self.catalog.search(name, pass, "", true)?.len() == 1)
    }

    /// Adds a storage rule; a bare pattern drops matching keys from the
    /// output. Columns already attached are not affected.
    ///
    /// # Errors
    /// Returns `InvalidRegex` if the pattern does not compile.
    pub fn add_drop(&mut self, rule: &str) -> Result<()> {
        self.rules.add(rule)?;
        self.known_lookups.clear();
        Ok(())
    }

    /// Storage rules in effect.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Searches the catalog. Empty patterns match everything.
    ///
    /// # Errors
    /// Returns `InvalidRegex` if any pattern does not compile.
    pub fn search(
        &self,
        name_match: &str,
        pass_match: &str,
        type_match: &str,
        full_string_match: bool,
    ) -> Result<Vec<ProductTag>> {
        self.catalog
            .search(name_match, pass_match, type_match, full_string_match)
    }

    /// Every product identity seen so far.
    #[must_use]
    pub fn products(&self) -> &[ProductTag] {
        self.catalog.entries()
    }

    /// Logs the catalog, one product per line.
    pub fn print_products(&self) {
        for tag in self.catalog.entries() {
            log::info!("{tag}");
        }
    }

    /// Header of the current event.
    ///
    /// # Errors
    /// Returns `TypeMismatch` only if the header slot was replaced.
    pub fn header(&self) -> Result<&EventHeader> {
        self.registry.get::<EventHeader>(EventHeader::KEY)
    }

    /// Mutable header of the current event.
    ///
    /// # Errors
    /// Returns `TypeMismatch` only if the header slot was replaced.
    pub fn header_mut(&mut self) -> Result<&mut EventHeader> {
        self.registry.get_mut::<EventHeader>(EventHeader::KEY)
    }

    /// Installs a new input target and rebinds every boarded slot to it.
    ///
    /// The catalog is rebuilt from the products of this process and the
    /// columns of the new target. Ignore rules switch off reading of
    /// matching columns unless a boarded slot reads them. Slots that were
    /// read from the previous target and have no column in the new one are
    /// taken off. If the target has a current row it is loaded. Returns the
    /// previous input target.
    ///
    /// # Errors
    /// Returns `Codec` if the current row cannot be decoded.
    pub fn set_input_tree(&mut self, mut tree: Tree) -> Result<Option<Tree>> {
        self.known_lookups.clear();
        self.catalog = self.produced.clone();

        let mut disabled = Vec::new();
        for column in tree.columns() {
            let key = column.name();
            if key != EventHeader::KEY && !self.rules.reads(key) {
                disabled.push(key.to_string());
            }
            match split_key(key) {
                Some((name, pass)) => {
                    self.catalog
                        .record(ProductTag::new(name, pass, column.schema().type_name()));
                }
                None => log::warn!("input column '{key}' does not follow the name{SEPARATOR}pass convention"),
            }
        }
        for key in disabled {
            if let Some(handle) = tree.column(&key) {
                tree.set_read_enabled(handle, false);
            }
        }

        for key in self.boarded_keys() {
            let was_read = self
                .registry
                .slot_ref(&key)
                .is_some_and(|slot| slot.binding(Direction::Read) != Binding::Unbound);
            if was_read
                && key != EventHeader::KEY
                && !self.filled.contains(&key)
                && tree.column(&key).is_none()
            {
                log::debug!("{key}: not in input tree '{}', taken off", tree.name());
                self.registry.take_off(&key);
            }
        }

        self.registry.detach_all(Direction::Read);
        for key in self.boarded_keys() {
            if let Some(handle) = self.registry.attach(&mut tree, &key, Direction::Read, false) {
                tree.set_read_enabled(handle, true);
            }
        }
        if let Some(row) = tree.current_row() {
            self.registry.load_all(&tree, row)?;
        }

        log::debug!(
            "input tree '{}' bound with {} entries",
            tree.name(),
            tree.entries()
        );
        Ok(self.input.replace(tree))
    }

    /// Installs a new output target and rebinds every boarded slot to it,
    /// creating columns for keys the target does not have yet. Returns the
    /// previous output target.
    pub fn set_output_tree(&mut self, mut tree: Tree) -> Option<Tree> {
        self.known_lookups.clear();

        self.registry.detach_all(Direction::Write);
        for key in self.boarded_keys() {
            if key == EventHeader::KEY || self.rules.writes(&key) {
                self.registry.attach(&mut tree, &key, Direction::Write, true);
            }
        }

        log::debug!("output tree '{}' bound", tree.name());
        self.output.replace(tree)
    }

    /// Removes the input target, detaching every read binding. Catalog
    /// entries imported from its columns are forgotten.
    pub fn take_input_tree(&mut self) -> Option<Tree> {
        self.known_lookups.clear();
        self.catalog = self.produced.clone();
        self.registry.detach_all(Direction::Read);
        self.input.take()
    }

    /// Removes the output target, detaching every write binding.
    pub fn take_output_tree(&mut self) -> Option<Tree> {
        self.known_lookups.clear();
        self.registry.detach_all(Direction::Write);
        self.output.take()
    }

    /// Current input target.
    #[must_use]
    pub fn input_tree(&self) -> Option<&Tree> {
        self.input.as_ref()
    }

    /// Current output target.
    #[must_use]
    pub fn output_tree(&self) -> Option<&Tree> {
        self.output.as_ref()
    }

    /// Moves the input target back before its first row.
    pub fn rewind_input(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.rewind();
        }
    }

    /// Advances to the next event.
    ///
    /// With an input target this moves to the next row and loads every
    /// bound slot, header included; returns false when the input is
    /// exhausted. Without input the header is numbered sequentially.
    ///
    /// # Errors
    /// Returns `Codec` if a cell cannot be decoded.
    pub fn next_event(&mut self) -> Result<bool> {
        if let Some(input) = self.input.as_mut() {
            if !input.advance() {
                return Ok(false);
            }
            let row = input.current_row().unwrap_or_default();
            self.registry.load_all(input, row)?;
            self.events_started += 1;
            log::trace!("loaded row {row} of '{}'", input.name());
        } else {
            self.events_started += 1;
            let number = i32::try_from(self.events_started).unwrap_or_else(|_| {
                log::warn!(
                    "event {} exceeds the header event number range, numbering stays at {}",
                    self.events_started,
                    i32::MAX
                );
                i32::MAX
            });
            let header = self.registry.get_mut::<EventHeader>(EventHeader::KEY)?;
            header.set_event_number(number);
            header.set_run(self.run_number);
        }
        Ok(true)
    }

    /// Finalizes the current row before it is persisted: the header is
    /// guaranteed a column in the output target and counts as written.
    pub fn before_fill(&mut self) {
        if let Some(output) = self.output.as_mut() {
            let bound = self
                .registry
                .slot_ref(EventHeader::KEY)
                .map(|slot| slot.binding(Direction::Write));
            let stale = match bound {
                Some(Binding::Bound(handle)) => handle.tree() != output.id(),
                _ => true,
            };
            if stale {
                self.registry
                    .attach(output, EventHeader::KEY, Direction::Write, true);
            }
        }
        self.filled.insert(EventHeader::KEY.to_string());
    }

    /// Persists the current row into the output target.
    ///
    /// Output columns no slot wrote are copied from the same-named input
    /// column when one exists, so unread input products pass through.
    ///
    /// # Errors
    /// Returns `Codec` if a value cannot be encoded.
    pub fn fill(&mut self) -> Result<()> {
        let Some(output) = self.output.as_mut() else {
            return Ok(());
        };
        self.registry.store_all(output)?;

        if let Some(input) = self.input.as_ref() {
            if let Some(row) = input.current_row() {
                let names: Vec<String> =
                    output.column_names().into_iter().map(String::from).collect();
                for name in names {
                    let Some(handle) = output.column(&name) else {
                        continue;
                    };
                    if output.is_staged(handle) || !self.rules.writes(&name) {
                        continue;
                    }
                    if let Some(cell) = input.cell_by_name(&name, row) {
                        output.stage(handle, cell.clone());
                    }
                }
            }
        }

        output.fill();
        Ok(())
    }

    /// Resets every slot and forgets which products were written.
    pub fn clear(&mut self) {
        self.filled.clear();
        self.registry.clear();
    }

    /// Hook for the end of an event; nothing is retained between events
    /// beyond the slots themselves.
    pub fn on_end_of_event(&mut self) {}

    /// Prepares for a new input file: every slot except a fresh header is
    /// taken off and the input target is handed back. Products are boarded
    /// again on their next `add` or `get`.
    pub fn on_end_of_file(&mut self) -> Option<Tree> {
        self.clear();
        self.registry.everybody_off();
        self.registry.board::<EventHeader>(EventHeader::KEY);
        self.take_input_tree()
    }

    /// Number of events started since construction.
    #[must_use]
    pub fn events_started(&self) -> u64 {
        self.events_started
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn boarded_keys(&self) -> Vec<String> {
        self.registry.keys().into_iter().map(String::from).collect()
    }

    fn resolve_key(&mut self, name: &str, pass: &str) -> Result<String> {
        if name == EventHeader::KEY || !pass.is_empty() {
            return Ok(make_key(name, pass));
        }
        if let Some(key) = self.known_lookups.get(name) {
            return Ok(key.clone());
        }

        let mut candidates: Vec<String> = self
            .catalog
            .search(name, "", "", true)?
            .iter()
            .map(|tag| make_key(tag.name(), tag.pass()))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        match candidates.len() {
            0 => Err(Error::ProductNotFound {
                name: name.to_string(),
                pass: String::new(),
            }),
            1 => {
                let key = candidates.remove(0);
                self.known_lookups.insert(name.to_string(), key.clone());
                Ok(key)
            }
            _ => Err(Error::ProductAmbiguous {
                name: name.to_string(),
                candidates,
            }),
        }
    }

    fn load_from_input<T: Product>(&mut self, name: &str, pass: &str, key: &str) -> Result<()> {
        let not_found = || Error::ProductNotFound {
            name: name.to_string(),
            pass: pass.to_string(),
        };
        let input = self.input.as_mut().ok_or_else(not_found)?;
        let handle = input.column(key).ok_or_else(not_found)?;
        if let Some(column) = input.column_at(handle) {
            if *column.schema() != T::schema() {
                return Err(Error::TypeMismatch {
                    key: key.to_string(),
                    expected: type_name::<T>(),
                    found: column.schema().to_string(),
                });
            }
        }
        let row = input.current_row().ok_or_else(not_found)?;

        self.registry.board::<T>(key);
        self.registry.attach(input, key, Direction::Read, false);
        input.set_read_enabled(handle, true);
        self.registry.load(key, input, row)?;
        log::trace!("{key}: boarded lazily from input row {row}");
        Ok(())
    }
}

impl fmt::Display for RecordBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RecordBus (pass '{}')", self.pass)?;
        write!(f, "{}", self.registry)
    }
}

impl fmt::Debug for RecordBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordBus")
            .field("pass", &self.pass)
            .field("registry", &self.registry)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}
