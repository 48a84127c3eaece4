//! In-memory column store.
//!
//! A [`Tree`] is one named stream of rows stored column by column. Columns
//! are created with a schema tag and hold one JSON cell per row, so the
//! store does not need to know the concrete product types. Slots address
//! columns through a [`ColumnHandle`], which also records the identity of
//! the tree it was issued by; a handle presented to any other tree is
//! rejected instead of silently reading or writing the wrong column.

use crate::schema::ColumnSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tree instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Binding of a slot to one column of one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnHandle {
    tree: TreeId,
    index: usize,
}

impl ColumnHandle {
    /// Identity of the tree this handle belongs to.
    #[must_use]
    pub fn tree(&self) -> TreeId {
        self.tree
    }
}

/// A named column: schema tag plus one cell per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    name: String,
    schema: ColumnSchema,
    cells: Vec<Value>,
    #[serde(skip, default = "read_enabled_default")]
    read_enabled: bool,
}

fn read_enabled_default() -> bool {
    true
}

impl Column {
    /// Creates an empty column.
    pub fn new(name: impl Into<String>, schema: ColumnSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            cells: Vec::new(),
            read_enabled: true,
        }
    }

    /// Creates a column holding already committed cells.
    pub fn with_cells(name: impl Into<String>, schema: ColumnSchema, cells: Vec<Value>) -> Self {
        Self {
            cells,
            ..Self::new(name, schema)
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema the column was created with.
    #[must_use]
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// All stored cells.
    #[must_use]
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    /// Whether rows of this column are loaded on read.
    #[must_use]
    pub fn is_read_enabled(&self) -> bool {
        self.read_enabled
    }
}

/// A named, row-oriented stream of columns.
pub struct Tree {
    id: TreeId,
    name: String,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    entries: usize,
    cursor: Option<usize>,
    staged: Vec<Option<Value>>,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TreeId::next(),
            name: name.into(),
            columns: Vec::new(),
            index: HashMap::new(),
            entries: 0,
            cursor: None,
            staged: Vec::new(),
        }
    }

    /// Rebuilds a tree from stored columns.
    ///
    /// # Errors
    /// Returns a message if a column does not hold exactly `entries` cells
    /// or a column name is repeated.
    pub fn from_columns(
        name: impl Into<String>,
        entries: usize,
        columns: Vec<Column>,
    ) -> std::result::Result<Self, String> {
        let mut tree = Self::new(name);
        for mut column in columns {
            if column.cells.len() != entries {
                return Err(format!(
                    "column '{}' holds {} cells, tree has {} entries",
                    column.name,
                    column.cells.len(),
                    entries
                ));
            }
            if tree.index.contains_key(&column.name) {
                return Err(format!("column '{}' appears twice", column.name));
            }
            column.read_enabled = true;
            tree.index.insert(column.name.clone(), tree.columns.len());
            tree.columns.push(column);
            tree.staged.push(None);
        }
        tree.entries = entries;
        Ok(tree)
    }

    /// Identity of this tree instance.
    #[must_use]
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Tree name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of committed rows.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Iterates over all columns in creation order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Names of all columns in creation order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up an existing column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<ColumnHandle> {
        self.index.get(name).map(|&index| ColumnHandle {
            tree: self.id,
            index,
        })
    }

    /// Returns the column behind a handle issued by this tree.
    #[must_use]
    pub fn column_at(&self, handle: ColumnHandle) -> Option<&Column> {
        self.resolve(handle).map(|i| &self.columns[i])
    }

    /// Creates a new column. Rows committed before the column existed are
    /// back-filled with `null` cells.
    ///
    /// Returns the existing handle if a column of that name already exists.
    pub fn create_column(&mut self, name: &str, schema: ColumnSchema) -> ColumnHandle {
        if let Some(handle) = self.column(name) {
            return handle;
        }
        let mut column = Column::new(name, schema);
        column.cells.resize(self.entries, Value::Null);
        let index = self.columns.len();
        self.index.insert(name.to_string(), index);
        self.columns.push(column);
        self.staged.push(None);
        ColumnHandle {
            tree: self.id,
            index,
        }
    }

    /// Enables or disables loading of a column on read.
    pub fn set_read_enabled(&mut self, handle: ColumnHandle, enabled: bool) {
        if let Some(i) = self.resolve(handle) {
            self.columns[i].read_enabled = enabled;
        }
    }

    /// Stages a cell for the row that the next [`Tree::fill`] commits.
    ///
    /// Returns false if the handle was not issued by this tree.
    pub fn stage(&mut self, handle: ColumnHandle, value: Value) -> bool {
        match self.resolve(handle) {
            Some(i) => {
                self.staged[i] = Some(value);
                true
            }
            None => false,
        }
    }

    /// Whether a cell has been staged for this column since the last fill.
    #[must_use]
    pub fn is_staged(&self, handle: ColumnHandle) -> bool {
        self.resolve(handle)
            .is_some_and(|i| self.staged[i].is_some())
    }

    /// Commits the staged row. Columns nothing was staged for get `null`.
    pub fn fill(&mut self) {
        for (column, staged) in self.columns.iter_mut().zip(self.staged.iter_mut()) {
            column.cells.push(staged.take().unwrap_or(Value::Null));
        }
        self.entries += 1;
    }

    /// Reads one cell. Disabled columns read as `None`.
    #[must_use]
    pub fn cell(&self, handle: ColumnHandle, row: usize) -> Option<&Value> {
        let column = &self.columns[self.resolve(handle)?];
        if !column.read_enabled {
            return None;
        }
        column.cells.get(row)
    }

    /// Reads one cell by column name, ignoring read-enable flags.
    #[must_use]
    pub fn cell_by_name(&self, name: &str, row: usize) -> Option<&Value> {
        let i = *self.index.get(name)?;
        self.columns[i].cells.get(row)
    }

    /// Current read row, if any row has been loaded.
    #[must_use]
    pub fn current_row(&self) -> Option<usize> {
        self.cursor
    }

    /// Moves the read cursor to `row`. Returns false if out of range.
    pub fn seek(&mut self, row: usize) -> bool {
        if row < self.entries {
            self.cursor = Some(row);
            true
        } else {
            false
        }
    }

    /// Advances the read cursor by one row. Returns false when exhausted.
    pub fn advance(&mut self) -> bool {
        let next = self.cursor.map_or(0, |row| row + 1);
        self.seek(next)
    }

    /// Puts the read cursor before the first row.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Creates an empty tree with a copy of the columns accepted by `keep`.
    #[must_use]
    pub fn clone_structure(&self, name: &str, keep: impl Fn(&str) -> bool) -> Tree {
        let mut tree = Tree::new(name);
        for column in self.columns.iter().filter(|c| keep(&c.name)) {
            tree.create_column(&column.name, column.schema.clone());
        }
        tree
    }

    fn resolve(&self, handle: ColumnHandle) -> Option<usize> {
        (handle.tree == self.id && handle.index < self.columns.len()).then_some(handle.index)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("name", &self.name)
            .field("entries", &self.entries)
            .field("columns", &self.column_names())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct TreeRef<'a> {
    name: &'a str,
    entries: usize,
    columns: &'a [Column],
}

#[derive(Deserialize)]
struct TreeOwned {
    name: String,
    entries: usize,
    columns: Vec<Column>,
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TreeRef {
            name: &self.name,
            entries: self.entries,
            columns: &self.columns,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let owned = TreeOwned::deserialize(deserializer)?;
        Tree::from_columns(owned.name, owned.entries, owned.columns)
            .map_err(serde::de::Error::custom)
    }
}
