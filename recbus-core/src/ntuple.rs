//! Flat analysis tables.
//!
//! [`NtupleManager`] owns named tables of scalar-ish variables that user
//! code sets once per entry and commits with [`NtupleManager::fill`].
//! Variables are plain slots bound for writing into their table.

use crate::error::{Error, Result};
use crate::product::Product;
use crate::registry::Registry;
use crate::slot::Direction;
use crate::tree::Tree;
use std::collections::{BTreeMap, HashMap};

/// Named flat tables with typed variables.
#[derive(Debug, Default)]
pub struct NtupleManager {
    tables: BTreeMap<String, Tree>,
    variables: Registry,
    owners: HashMap<String, String>,
}

impl NtupleManager {
    /// Creates a manager without tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table.
    ///
    /// # Errors
    /// Returns `TableExists` if a table of that name was already created.
    pub fn create(&mut self, table: &str) -> Result<()> {
        if self.tables.contains_key(table) {
            return Err(Error::TableExists(table.to_string()));
        }
        self.tables.insert(table.to_string(), Tree::new(table));
        log::debug!("created ntuple '{table}'");
        Ok(())
    }

    /// Adds a variable column to a table.
    ///
    /// Variable names are global across tables.
    ///
    /// # Errors
    /// Returns `VariableExists` if the name is taken and `UnknownTable` if
    /// the table was never created.
    pub fn add_var<T: Product>(&mut self, table: &str, name: &str) -> Result<()> {
        if self.variables.is_on_board(name) {
            return Err(Error::VariableExists(name.to_string()));
        }
        let tree = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;

        self.variables.board::<T>(name);
        self.variables.attach(tree, name, Direction::Write, true);
        self.owners.insert(name.to_string(), table.to_string());
        Ok(())
    }

    /// Sets the value of a variable for the pending entry.
    ///
    /// Setting an unknown variable logs a warning and does nothing.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if the variable was added with another type.
    pub fn set_var<T: Product>(&mut self, name: &str, value: T) -> Result<()> {
        if !self.variables.is_on_board(name) {
            log::warn!("ntuple variable '{name}' was never added, value ignored");
            return Ok(());
        }
        self.variables.update(name, value)
    }

    /// Current value of a variable.
    ///
    /// # Errors
    /// Returns `ProductNotFound` for an unknown variable and `TypeMismatch`
    /// if `T` is not the type it was added with.
    pub fn get_var<T: Product>(&self, name: &str) -> Result<&T> {
        self.variables.get::<T>(name)
    }

    /// Commits one entry into every table.
    ///
    /// # Errors
    /// Returns `Codec` if a value cannot be encoded.
    pub fn fill(&mut self) -> Result<()> {
        for tree in self.tables.values_mut() {
            self.variables.store_all(tree)?;
            tree.fill();
        }
        Ok(())
    }

    /// Commits one entry into a single table.
    ///
    /// # Errors
    /// Returns `UnknownTable` for a table that was never created and `Codec`
    /// if a value cannot be encoded.
    pub fn fill_table(&mut self, table: &str) -> Result<()> {
        let tree = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;
        self.variables.store_all(tree)?;
        tree.fill();
        Ok(())
    }

    /// Resets every variable to its empty value.
    pub fn clear(&mut self) {
        self.variables.clear();
    }

    /// Drops every table and variable.
    pub fn reset(&mut self) {
        self.tables.clear();
        self.variables.everybody_off();
        self.owners.clear();
    }

    /// Table a variable belongs to.
    #[must_use]
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.owners.get(name).map(String::as_str)
    }

    /// Names of all tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Looks up a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Tree> {
        self.tables.get(name)
    }

    /// All tables keyed by name.
    #[must_use]
    pub fn tables(&self) -> &BTreeMap<String, Tree> {
        &self.tables
    }

    /// Hands the tables over for persisting, leaving the manager empty.
    pub fn take_tables(&mut self) -> BTreeMap<String, Tree> {
        self.variables.everybody_off();
        self.owners.clear();
        std::mem::take(&mut self.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_twice() {
        let mut ntuples = NtupleManager::new();
        ntuples.create("hits").unwrap();
        assert!(matches!(ntuples.create("hits"), Err(Error::TableExists(_))));
    }

    #[test]
    fn test_add_var_errors() {
        let mut ntuples = NtupleManager::new();
        assert!(matches!(
            ntuples.add_var::<f64>("missing", "x"),
            Err(Error::UnknownTable(_))
        ));
        ntuples.create("a").unwrap();
        ntuples.create("b").unwrap();
        ntuples.add_var::<f64>("a", "x").unwrap();
        assert!(matches!(
            ntuples.add_var::<f64>("b", "x"),
            Err(Error::VariableExists(_))
        ));
        assert_eq!(ntuples.owner("x"), Some("a"));
    }

    #[test]
    fn test_fill_and_clear() {
        let mut ntuples = NtupleManager::new();
        ntuples.create("summary").unwrap();
        ntuples.add_var::<i32>("summary", "nhits").unwrap();
        ntuples.add_var::<f64>("summary", "energy").unwrap();

        ntuples.set_var("nhits", 12_i32).unwrap();
        ntuples.set_var("energy", 3.5_f64).unwrap();
        ntuples.fill().unwrap();
        ntuples.clear();
        ntuples.fill().unwrap();

        let table = ntuples.table("summary").unwrap();
        assert_eq!(table.entries(), 2);
        assert_eq!(table.cell_by_name("nhits", 0), Some(&json!(12)));
        assert_eq!(table.cell_by_name("energy", 0), Some(&json!(3.5)));
        assert_eq!(table.cell_by_name("nhits", 1), Some(&json!(i32::MIN)));
    }

    #[test]
    fn test_set_unknown_variable_is_ignored() {
        let mut ntuples = NtupleManager::new();
        ntuples.set_var("ghost", 1_i32).unwrap();
        assert!(ntuples.get_var::<i32>("ghost").is_err());
    }

    #[test]
    fn test_set_var_type_mismatch() {
        let mut ntuples = NtupleManager::new();
        ntuples.create("t").unwrap();
        ntuples.add_var::<i32>("t", "n").unwrap();
        assert!(matches!(
            ntuples.set_var("n", 1.0_f32),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_take_tables() {
        let mut ntuples = NtupleManager::new();
        ntuples.create("t").unwrap();
        ntuples.add_var::<u8>("t", "flag").unwrap();
        ntuples.fill().unwrap();
        let tables = ntuples.take_tables();
        assert_eq!(tables["t"].entries(), 1);
        assert!(ntuples.table_names().is_empty());
        ntuples.add_var::<u8>("t", "other").unwrap_err();
    }
}
