//! Persistence of ntuple tables.

use crate::format::{read_document, write_document, Document};
use crate::Result;
use recbus_core::{NtupleManager, Tree};
use std::collections::BTreeMap;
use std::path::Path;

/// Writes every table of `ntuples` into one file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_ntuples<P: AsRef<Path>>(path: P, ntuples: &NtupleManager, pretty: bool) -> Result<()> {
    let mut document = Document::new();
    for table in ntuples.tables().values() {
        let columns = table.columns().cloned().collect();
        let copy = Tree::from_columns(table.name(), table.entries(), columns)
            .map_err(crate::Error::InvalidFormat)?;
        document.insert(copy);
    }
    write_document(path, &document, pretty)
}

/// Reads every table of an ntuple file.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_ntuples<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, Tree>> {
    let mut document = read_document(path)?;
    let names: Vec<String> = document.trees().keys().cloned().collect();
    Ok(names
        .into_iter()
        .filter_map(|name| document.take(&name).map(|tree| (name, tree)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_ntuples_to_disk() {
        let mut ntuples = NtupleManager::new();
        ntuples.create("ecal").unwrap();
        ntuples.create("hcal").unwrap();
        ntuples.add_var::<f64>("ecal", "total_energy").unwrap();
        ntuples.add_var::<i32>("hcal", "max_pe").unwrap();
        for i in 0..3_i32 {
            ntuples.set_var("total_energy", f64::from(i) * 0.5).unwrap();
            ntuples.set_var("max_pe", i * 10).unwrap();
            ntuples.fill().unwrap();
            ntuples.clear();
        }

        let file = NamedTempFile::new().unwrap();
        write_ntuples(file.path(), &ntuples, false).unwrap();
        let tables = read_ntuples(file.path()).unwrap();

        assert_eq!(tables.keys().collect::<Vec<_>>(), vec!["ecal", "hcal"]);
        let ecal = &tables["ecal"];
        assert_eq!(ecal.entries(), 3);
        let last = ecal.cell_by_name("total_energy", 2).unwrap().as_f64().unwrap();
        assert_relative_eq!(last, 1.0);
        assert!(ecal.column("max_pe").is_none());
    }
}
