//! recbus CLI: inspect event files.
//!
//! This binary lists the trees of a file, searches its product catalog and
//! dumps individual columns.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand};
use recbus_core::{RecordBus, Tree};
use recbus_io::{read_document, Document, EventFile, EventFileConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    RecbusIo(#[from] recbus_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] recbus_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no tree '{tree}' in '{}'", path.display())]
    MissingTree { path: PathBuf, tree: String },

    #[error("no column '{column}' in tree '{tree}'")]
    MissingColumn { tree: String, column: String },

    #[error("row {row} out of range, tree '{tree}' has {entries} entries")]
    RowOutOfRange {
        tree: String,
        row: usize,
        entries: usize,
    },
}

/// Inspector for recbus event files.
#[derive(Parser)]
#[command(name = "recbus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show trees, entries and columns of a file
    Info {
        /// Input file
        input: PathBuf,

        /// Also print the run headers
        #[arg(long)]
        runs: bool,
    },

    /// Search the products stored in a file
    Search {
        /// Input file
        input: PathBuf,

        /// Product name pattern
        #[arg(long, default_value = "")]
        name: String,

        /// Pass pattern
        #[arg(long, default_value = "")]
        pass: String,

        /// Type pattern
        #[arg(long = "type", default_value = "")]
        type_name: String,

        /// Patterns must match whole fields
        #[arg(long)]
        exact: bool,

        /// Tree holding the events
        #[arg(long, default_value = "Events")]
        tree: String,
    },

    /// Print the cells of one column
    Dump {
        /// Input file
        input: PathBuf,

        /// Column key, e.g. EcalHits_reco
        #[arg(short, long)]
        column: String,

        /// Only this row
        #[arg(short, long)]
        row: Option<usize>,

        /// Tree holding the column
        #[arg(long, default_value = "Events")]
        tree: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Info { input, runs } => {
            let document = read_document(&input)?;
            print!("{}", describe_document(&input, &document));

            if runs {
                let file = EventFile::open(&input, EventFileConfig::default())?;
                for header in file.run_headers() {
                    print!("{header}");
                }
            }
        }

        Commands::Search {
            input,
            name,
            pass,
            type_name,
            exact,
            tree,
        } => {
            let mut document = read_document(&input)?;
            let events = document.take(&tree).ok_or_else(|| CliError::MissingTree {
                path: input.clone(),
                tree: tree.clone(),
            })?;

            let mut bus = RecordBus::new("inspect");
            bus.set_input_tree(events)?;
            let found = bus.search(&name, &pass, &type_name, exact)?;
            log::debug!("{} of {} products match", found.len(), bus.products().len());
            for tag in found {
                println!("{tag}");
            }
        }

        Commands::Dump {
            input,
            column,
            row,
            tree,
        } => {
            let document = read_document(&input)?;
            let events = document.tree(&tree).ok_or_else(|| CliError::MissingTree {
                path: input.clone(),
                tree: tree.clone(),
            })?;
            print!("{}", dump_column(events, &column, row)?);
        }
    }

    Ok(())
}

fn describe_document(path: &Path, document: &Document) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", path.display());
    let _ = writeln!(out, "Format version: {}", document.format_version());
    for tree in document.trees().values() {
        out.push_str(&describe_tree(tree));
    }
    out
}

fn describe_tree(tree: &Tree) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Tree '{}': {} entries", tree.name(), tree.entries());
    for column in tree.columns() {
        let _ = writeln!(out, "  {:<32} {}", column.name(), column.schema());
    }
    out
}

fn dump_column(tree: &Tree, column: &str, row: Option<usize>) -> Result<String> {
    if tree.column(column).is_none() {
        return Err(CliError::MissingColumn {
            tree: tree.name().to_string(),
            column: column.to_string(),
        });
    }

    let rows = match row {
        Some(row) if row >= tree.entries() => {
            return Err(CliError::RowOutOfRange {
                tree: tree.name().to_string(),
                row,
                entries: tree.entries(),
            });
        }
        Some(row) => row..row + 1,
        None => 0..tree.entries(),
    };

    let mut out = String::new();
    for row in rows {
        if let Some(cell) = tree.cell_by_name(column, row) {
            let _ = writeln!(out, "[{row}] {}", serde_json::to_string(cell)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recbus_core::{ColumnSchema, ScalarCode};
    use serde_json::json;

    fn tree() -> Tree {
        let mut tree = Tree::new("Events");
        let h = tree.create_column("Count_reco", ColumnSchema::Scalar(ScalarCode::I32));
        tree.stage(h, json!(3));
        tree.fill();
        tree.stage(h, json!(5));
        tree.fill();
        tree
    }

    #[test]
    fn test_describe_tree() {
        let text = describe_tree(&tree());
        assert!(text.starts_with("Tree 'Events': 2 entries"));
        assert!(text.contains("Count_reco"));
        assert!(text.contains("/I"));
    }

    #[test]
    fn test_dump_column() {
        let tree = tree();
        assert_eq!(dump_column(&tree, "Count_reco", None).unwrap(), "[0] 3\n[1] 5\n");
        assert_eq!(dump_column(&tree, "Count_reco", Some(1)).unwrap(), "[1] 5\n");
        assert!(matches!(
            dump_column(&tree, "Count_reco", Some(2)),
            Err(CliError::RowOutOfRange { .. })
        ));
        assert!(matches!(
            dump_column(&tree, "Other_reco", None),
            Err(CliError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_describe_document_from_disk() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut document = Document::new();
        document.insert(tree());
        recbus_io::write_document(file.path(), &document, false).unwrap();

        let back = read_document(file.path()).unwrap();
        let text = describe_document(file.path(), &back);
        assert!(text.contains("Format version: 1"));
        assert!(text.contains("Tree 'Events': 2 entries"));
    }
}
