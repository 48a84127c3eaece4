//! Column schema descriptors.
//!
//! Every product type declares its column schema statically. Primitive
//! scalars map onto a single-character type code, everything else carries
//! a fully qualified schema name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Single-character codes for primitive scalar columns.
///
/// Persisted as the code character itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "char", try_from = "char")]
pub enum ScalarCode {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarCode {
    /// Returns the single-character type code written with the column.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Bool => 'O',
            Self::I8 => 'B',
            Self::U8 => 'b',
            Self::I16 => 'S',
            Self::U16 => 's',
            Self::I32 => 'I',
            Self::U32 => 'i',
            Self::I64 => 'L',
            Self::U64 => 'l',
            Self::F32 => 'F',
            Self::F64 => 'D',
        }
    }

    /// Parses a type code back into a scalar kind.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'O' => Self::Bool,
            'B' => Self::I8,
            'b' => Self::U8,
            'S' => Self::I16,
            's' => Self::U16,
            'I' => Self::I32,
            'i' => Self::U32,
            'L' => Self::I64,
            'l' => Self::U64,
            'F' => Self::F32,
            'D' => Self::F64,
            _ => return None,
        })
    }

    /// Rust spelling of the scalar type.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl From<ScalarCode> for char {
    fn from(code: ScalarCode) -> Self {
        code.code()
    }
}

impl TryFrom<char> for ScalarCode {
    type Error = String;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown scalar type code '{code}'"))
    }
}

/// Schema tag a column is created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tag", rename_all = "snake_case")]
pub enum ColumnSchema {
    /// Primitive scalar leaf.
    Scalar(ScalarCode),
    /// Complex value with a fully qualified schema name.
    Object(String),
}

impl ColumnSchema {
    /// Creates an object schema from a schema name.
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    /// Human-readable type name, used in the product catalog.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Scalar(code) => code.type_name(),
            Self::Object(name) => name,
        }
    }

    /// Returns true for primitive scalar columns.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(code) => write!(f, "/{}", code.code()),
            Self::Object(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_codes_roundtrip() {
        for code in [
            ScalarCode::Bool,
            ScalarCode::I16,
            ScalarCode::I32,
            ScalarCode::I64,
            ScalarCode::F32,
            ScalarCode::F64,
        ] {
            assert_eq!(ScalarCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ScalarCode::from_code('x'), None);
    }

    #[test]
    fn test_schema_display() {
        assert_eq!(ColumnSchema::Scalar(ScalarCode::F64).to_string(), "/D");
        assert_eq!(ColumnSchema::object("Vec<i32>").to_string(), "Vec<i32>");
        assert_eq!(ColumnSchema::Scalar(ScalarCode::I32).type_name(), "i32");
    }

    #[test]
    fn test_scalar_persisted_as_code() {
        let text = serde_json::to_string(&ColumnSchema::Scalar(ScalarCode::U16)).unwrap();
        assert_eq!(text, r#"{"kind":"scalar","tag":"s"}"#);
        let back: ColumnSchema = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ColumnSchema::Scalar(ScalarCode::U16));
        assert!(serde_json::from_str::<ColumnSchema>(r#"{"kind":"scalar","tag":"x"}"#).is_err());
    }
}
