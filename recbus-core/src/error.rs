//! Error types for recbus-core.

use thiserror::Error;

/// Result type alias for recbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for registry, record bus and ntuple operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Product name contains the reserved separator.
    #[error("product name '{name}' is illegal as it contains the reserved separator '_'")]
    IllegalName { name: String },

    /// Product was already written during this event.
    #[error("product '{key}' already exists in the event (written by an earlier stage)")]
    ProductExists { key: String },

    /// Typed access disagrees with the type of the slot or input column.
    #[error("type mismatch for '{key}': requested {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// No product matches the requested name and pass.
    #[error("no product found for name '{name}' and pass '{pass}'")]
    ProductNotFound { name: String, pass: String },

    /// More than one pass provides a product with this name.
    #[error("multiple products found for name '{name}' without specified pass name ({})", candidates.join(", "))]
    ProductAmbiguous {
        name: String,
        candidates: Vec<String>,
    },

    /// Pattern could not be compiled.
    #[error("the pattern '{pattern}' is not a valid regular expression: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Slot value could not be moved to or from its column.
    #[error("could not convert '{key}' to or from its column: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Ntuple table was created twice.
    #[error("a table named '{0}' has already been created")]
    TableExists(String),

    /// Ntuple table does not exist.
    #[error("no table named '{0}' has been created")]
    UnknownTable(String),

    /// Ntuple variable was added twice.
    #[error("a variable named '{0}' has already been defined")]
    VariableExists(String),
}

impl Error {
    /// Returns true for errors that signal a broken pipeline contract
    /// (naming, double writes, schema drift) rather than missing data.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::IllegalName { .. } | Self::ProductExists { .. } | Self::TypeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = Error::ProductAmbiguous {
            name: "Hits".to_string(),
            candidates: vec!["Hits_passA".to_string(), "Hits_passB".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Hits_passA, Hits_passB"));
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_contract_violations() {
        assert!(Error::ProductExists {
            key: "a_b".to_string()
        }
        .is_contract_violation());
        assert!(!Error::ProductNotFound {
            name: "a".to_string(),
            pass: String::new()
        }
        .is_contract_violation());
    }
}
