//! Product catalog and pattern search.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identity of one product: name, pass and schema type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductTag {
    name: String,
    pass: String,
    type_name: String,
}

impl ProductTag {
    /// Creates a tag.
    pub fn new(
        name: impl Into<String>,
        pass: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pass: pass.into(),
            type_name: type_name.into(),
        }
    }

    /// Product name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pass that produced the product.
    #[must_use]
    pub fn pass(&self) -> &str {
        &self.pass
    }

    /// Schema type name recorded at registration.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Display for ProductTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name: {}, Pass: {}, Type: {}",
            self.name, self.pass, self.type_name
        )
    }
}

/// Builds a case-insensitive matcher for a catalog field.
///
/// An empty pattern matches everything. With `full_string_match` the
/// pattern must cover the entire field.
///
/// # Errors
/// Returns `InvalidRegex` if the pattern does not compile.
pub fn field_regex(pattern: &str, full_string_match: bool) -> Result<Regex> {
    let source = if pattern.is_empty() {
        ".*".to_string()
    } else if full_string_match {
        format!("^(?:{pattern})$")
    } else {
        pattern.to_string()
    };
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|source| Error::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

/// Append-only list of every product identity seen in this process.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    entries: Vec<ProductTag>,
    seen: HashSet<(String, String)>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a tag unless its (name, pass) identity is already present.
    ///
    /// Returns true if the tag was new.
    pub fn record(&mut self, tag: ProductTag) -> bool {
        let identity = (tag.name.clone(), tag.pass.clone());
        if !self.seen.insert(identity) {
            return false;
        }
        self.entries.push(tag);
        true
    }

    /// Checks whether an identity has been recorded.
    #[must_use]
    pub fn contains(&self, name: &str, pass: &str) -> bool {
        self.seen.contains(&(name.to_string(), pass.to_string()))
    }

    /// All entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[ProductTag] {
        &self.entries
    }

    /// Number of recorded identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns entries whose name, pass and type all match their patterns.
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
        let name_re = field_regex(name_match, full_string_match)?;
        let pass_re = field_regex(pass_match, full_string_match)?;
        let type_re = field_regex(type_match, full_string_match)?;

        Ok(self
            .entries
            .iter()
            .filter(|tag| {
                name_re.is_match(&tag.name)
                    && pass_re.is_match(&tag.pass)
                    && type_re.is_match(&tag.type_name)
            })
            .cloned()
            .collect())
    }
}
