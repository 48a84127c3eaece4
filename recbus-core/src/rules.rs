//! Storage rules deciding which products reach the output.
//!
//! Rule grammar: an optional keyword (`keep`, `drop` or `ignore`) followed
//! by a case-insensitive extended regular expression matched against the
//! internal key. A bare pattern is a drop rule. Whitespace inside the
//! pattern is removed, and a pattern not ending in `*` gets `.*` appended.

use crate::catalog::field_regex;
use crate::error::Result;
use regex::Regex;

/// What a matching rule does with a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Write to the output even if an earlier rule dropped it.
    Keep,
    /// Readable from input, never written to output.
    Drop,
    /// Not read from input unless explicitly requested, never written.
    Ignore,
}

/// One compiled storage rule.
#[derive(Debug, Clone)]
pub struct StorageRule {
    kind: RuleKind,
    pattern: String,
    regex: Regex,
}

impl StorageRule {
    /// Parses and compiles a rule. Returns `Ok(None)` for a rule without a
    /// pattern.
    ///
    /// # Errors
    /// Returns `InvalidRegex` if the pattern does not compile.
    pub fn parse(rule: &str) -> Result<Option<Self>> {
        let trimmed = rule.trim();
        let (kind, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((word, rest)) => match keyword(word) {
                Some(kind) => (kind, rest),
                None => (RuleKind::Drop, trimmed),
            },
            None => match keyword(trimmed) {
                Some(_) => return Ok(None),
                None => (RuleKind::Drop, trimmed),
            },
        };

        let mut pattern: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
        if pattern.is_empty() {
            return Ok(None);
        }
        if !pattern.ends_with('*') {
            pattern.push_str(".*");
        }

        let regex = field_regex(&pattern, false)?;
        Ok(Some(Self {
            kind,
            pattern,
            regex,
        }))
    }

    /// Kind of rule.
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Normalized pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Tests the rule against an internal key.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

fn keyword(word: &str) -> Option<RuleKind> {
    match word.to_ascii_lowercase().as_str() {
        "keep" => Some(RuleKind::Keep),
        "drop" => Some(RuleKind::Drop),
        "ignore" => Some(RuleKind::Ignore),
        _ => None,
    }
}

/// Ordered rule list; the last matching rule decides.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<StorageRule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and appends a rule.
    ///
    /// # Errors
    /// Returns `InvalidRegex` if the pattern does not compile.
    pub fn add(&mut self, rule: &str) -> Result<()> {
        match StorageRule::parse(rule)? {
            Some(rule) => self.rules.push(rule),
            None => log::warn!("ignoring storage rule without a pattern: '{rule}'"),
        }
        Ok(())
    }

    /// The deciding rule kind for a key, if any rule matches.
    #[must_use]
    pub fn decide(&self, key: &str) -> Option<RuleKind> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(key))
            .map(StorageRule::kind)
    }

    /// Whether a product with this key may be written to the output.
    #[must_use]
    pub fn writes(&self, key: &str) -> bool {
        !matches!(self.decide(key), Some(RuleKind::Drop | RuleKind::Ignore))
    }

    /// Whether an input column with this key is read by default.
    #[must_use]
    pub fn reads(&self, key: &str) -> bool {
        self.decide(key) != Some(RuleKind::Ignore)
    }

    /// All rules in order.
    #[must_use]
    pub fn rules(&self) -> &[StorageRule] {
        &self.rules
    }

    /// Returns true if no rules are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
