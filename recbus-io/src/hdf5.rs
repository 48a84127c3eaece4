//! HDF5 backend.
//!
//! Each tree is a group carrying an `entries` attribute and an ordered
//! `columns` attribute. Each column is a variable-length string dataset
//! with one JSON-encoded cell per row and a `schema` attribute.

use crate::{Error, Result};
use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};
use ndarray::ArrayView1;
use recbus_core::{Column, ColumnSchema, Tree};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;

/// Writes trees into a new HDF5 file, one group per tree.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or a cell cannot be encoded.
pub fn write_trees<'a, P, I>(path: P, trees: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Tree>,
{
    let file = File::create(path)?;
    set_attr_str_file(
        &file,
        "recbus_format_version",
        &crate::FORMAT_VERSION.to_string(),
    )?;

    for tree in trees {
        let group = file.create_group(tree.name())?;
        let entries = tree.entries() as u64;
        group
            .new_attr::<u64>()
            .create("entries")?
            .write_scalar(&entries)?;
        set_str_list_attr(&group, "columns", &tree.column_names())?;

        for column in tree.columns() {
            write_column(&group, column)?;
        }
    }
    Ok(())
}

/// Reads every tree group of an HDF5 file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the layout is not a recbus file.
pub fn read_trees<P: AsRef<Path>>(path: P) -> Result<Vec<Tree>> {
    let file = File::open(path)?;
    let mut trees = Vec::new();
    for name in file.member_names()? {
        let group = file.group(&name)?;
        trees.push(read_tree(&name, &group)?);
    }
    Ok(trees)
}

fn write_column(group: &Group, column: &Column) -> Result<()> {
    let cells: Vec<VarLenUnicode> = column
        .cells()
        .iter()
        .map(|cell| to_var_len_unicode(&cell.to_string()))
        .collect::<Result<Vec<_>>>()?;
    let dataset = group
        .new_dataset::<VarLenUnicode>()
        .shape((cells.len(),))
        .create(column.name())?;
    if !cells.is_empty() {
        dataset.write(ArrayView1::from(cells.as_slice()))?;
    }

    let schema = serde_json::to_string(column.schema())?;
    let value = to_var_len_unicode(&schema)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("schema")?
        .write_scalar(&value)?;
    Ok(())
}

fn read_tree(name: &str, group: &Group) -> Result<Tree> {
    let entries = group.attr("entries")?.read_scalar::<u64>()?;
    let entries = usize::try_from(entries)
        .map_err(|_| Error::InvalidFormat(format!("tree '{name}' is too large")))?;

    let names: Vec<VarLenUnicode> = group.attr("columns")?.read_raw()?;
    let mut columns = Vec::with_capacity(names.len());
    for column in &names {
        let dataset = group.dataset(column.as_str())?;
        let schema: VarLenUnicode = dataset.attr("schema")?.read_scalar()?;
        let schema: ColumnSchema = serde_json::from_str(schema.as_str())?;
        let cells = if entries == 0 {
            Vec::new()
        } else {
            dataset
                .read_raw::<VarLenUnicode>()?
                .iter()
                .map(|cell| serde_json::from_str::<Value>(cell.as_str()))
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        columns.push(Column::with_cells(column.as_str(), schema, cells));
    }

    Tree::from_columns(name, entries, columns).map_err(Error::InvalidFormat)
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_str_list_attr(group: &Group, name: &str, items: &[&str]) -> Result<()> {
    let values: Vec<VarLenUnicode> = items
        .iter()
        .map(|item| to_var_len_unicode(item))
        .collect::<Result<Vec<_>>>()?;
    let attr = group
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?;
    if !values.is_empty() {
        attr.write(ArrayView1::from(values.as_slice()))?;
    }
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 string: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recbus_core::ScalarCode;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hdf5_tree_roundtrip() {
        let mut tree = Tree::new("Events");
        let n = tree.create_column("n_reco", ColumnSchema::Scalar(ScalarCode::I32));
        let e = tree.create_column("e_reco", ColumnSchema::object("Vec<f64>"));
        tree.stage(n, json!(3));
        tree.stage(e, json!([1.5, 2.0]));
        tree.fill();
        tree.fill();

        let file = NamedTempFile::with_suffix(".h5").unwrap();
        write_trees(file.path(), [&tree]).unwrap();

        let back = read_trees(file.path()).unwrap();
        assert_eq!(back.len(), 1);
        let back = &back[0];
        assert_eq!(back.name(), "Events");
        assert_eq!(back.entries(), 2);
        assert_eq!(back.column_names(), vec!["n_reco", "e_reco"]);
        assert_eq!(back.cell_by_name("e_reco", 0), Some(&json!([1.5, 2.0])));
        assert_eq!(back.cell_by_name("n_reco", 1), Some(&Value::Null));
    }
}
