//! Product trait: what a type needs to ride on the bus.
//!
//! The reset strategy is chosen per type at compile time: numbers fall back
//! to their minimum sentinel, containers empty themselves, and complex
//! values provide their own reset. Types that do not implement [`Product`]
//! are rejected when the call site is compiled.

use crate::schema::{ColumnSchema, ScalarCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A value that can be stored in a registry slot and bound to a column.
pub trait Product: Default + Clone + Debug + Serialize + DeserializeOwned + 'static {
    /// Statically declared column schema for this type.
    fn schema() -> ColumnSchema;

    /// Returns the value to its well-defined empty state.
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Post-update hook so that repeated identical inputs serialize
    /// identically.
    fn normalize(&mut self) {}
}

macro_rules! scalar_product {
    ($($ty:ty => $code:ident),* $(,)?) => {
        $(
            impl Product for $ty {
                fn schema() -> ColumnSchema {
                    ColumnSchema::Scalar(ScalarCode::$code)
                }

                fn reset(&mut self) {
                    *self = <$ty>::MIN;
                }
            }
        )*
    };
}

scalar_product! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl Product for bool {
    fn schema() -> ColumnSchema {
        ColumnSchema::Scalar(ScalarCode::Bool)
    }

    fn reset(&mut self) {
        *self = false;
    }
}

impl Product for String {
    fn schema() -> ColumnSchema {
        ColumnSchema::object("String")
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<T: Product> Product for Vec<T> {
    fn schema() -> ColumnSchema {
        ColumnSchema::Object(format!("Vec<{}>", T::schema().type_name()))
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<K, V> Product for BTreeMap<K, V>
where
    K: Product + Ord,
    V: Product,
{
    fn schema() -> ColumnSchema {
        ColumnSchema::Object(format!(
            "BTreeMap<{},{}>",
            K::schema().type_name(),
            V::schema().type_name()
        ))
    }

    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_reset_to_minimum() {
        let mut i = 42_i32;
        i.reset();
        assert_eq!(i, i32::MIN);

        let mut d = 3.5_f64;
        d.reset();
        assert_eq!(d, f64::MIN);

        let mut b = true;
        b.reset();
        assert!(!b);
    }

    #[test]
    fn test_container_reset_to_empty() {
        let mut v = vec![1_u16, 2, 3];
        v.reset();
        assert!(v.is_empty());

        let mut m = BTreeMap::from([(1_i32, 2.0_f32)]);
        m.reset();
        assert!(m.is_empty());
    }

    #[test]
    fn test_container_schemas() {
        assert_eq!(<Vec<i32>>::schema(), ColumnSchema::object("Vec<i32>"));
        assert_eq!(
            <Vec<Vec<f64>>>::schema(),
            ColumnSchema::object("Vec<Vec<f64>>")
        );
        assert_eq!(
            <BTreeMap<u32, String>>::schema(),
            ColumnSchema::object("BTreeMap<u32,String>")
        );
    }
}
