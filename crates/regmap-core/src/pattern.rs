//! Named value sets.

use std::collections::BTreeMap;
use std::fmt;

use crate::field::{canonical_name, FieldKind, ScalarKind};
use crate::table::RegisterTable;

/// A value held by a pattern before validation against its field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PatternValue {
    /// Literal text, validated when the pattern is encoded.
    Text(String),
    /// Already numeric value.
    Int(i64),
}

impl fmt::Display for PatternValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(value) => write!(f, "{value}"),
        }
    }
}

/// One named assignment of field values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pattern {
    /// Identifier, usually the source file stem or sheet column name.
    pub name: String,
    values: BTreeMap<String, PatternValue>,
}

impl Pattern {
    /// Creates an empty pattern.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Pattern holding every field's default.
    #[must_use]
    pub fn defaults(name: impl Into<String>, table: &RegisterTable) -> Self {
        let mut pattern = Self::new(name);
        for field in table.fields() {
            let value = match &field.kind {
                FieldKind::Bits(bits) => PatternValue::Int(bits.init_val),
                FieldKind::Scalar(ScalarKind::Int(v)) => PatternValue::Int(*v),
                FieldKind::Scalar(ScalarKind::Float(v)) => {
                    PatternValue::Text(format!("{v:?}"))
                }
                FieldKind::Scalar(ScalarKind::Str { init, .. }) => {
                    PatternValue::Text(init.clone())
                }
            };
            pattern.set(&field.name, value);
        }
        pattern
    }

    /// Assigns `value` to `name` (case-insensitive).
    pub fn set(&mut self, name: &str, value: PatternValue) {
        self.values.insert(canonical_name(name), value);
    }

    /// Value for `name` (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PatternValue> {
        self.values.get(&canonical_name(name))
    }

    /// Values keyed by canonical name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatternValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of assigned fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no field is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Non-fatal observation made while encoding a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A field was absent and its default was used.
    MissingField {
        /// Pattern name.
        pattern: String,
        /// Canonical field name.
        field: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { pattern, field } => write!(
                f,
                "'{}' is not found in pattern '{pattern}', use default value.",
                field.to_lowercase()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{BitField, BitRange, Field};

    #[test]
    fn names_are_case_insensitive() {
        let mut pattern = Pattern::new("p");
        pattern.set("Enable", PatternValue::Int(1));
        assert_eq!(pattern.get("ENABLE"), Some(&PatternValue::Int(1)));
        assert_eq!(pattern.get("enable"), Some(&PatternValue::Int(1)));
        assert_eq!(pattern.len(), 1);
    }

    #[test]
    fn defaults_cover_every_field() {
        let mut table = RegisterTable::new();
        let range = BitRange::new(3, 1).unwrap();
        table
            .add_field(Field::bits(
                "mode",
                BitField::new(0, range, false, 2).unwrap(),
                false,
                None,
            ))
            .unwrap();
        table
            .add_field(Field::scalar("ratio", ScalarKind::Float(0.5), None))
            .unwrap();

        let pattern = Pattern::defaults("init", &table);
        assert_eq!(pattern.get("mode"), Some(&PatternValue::Int(2)));
        assert_eq!(
            pattern.get("ratio"),
            Some(&PatternValue::Text("0.5".into()))
        );
    }

    #[test]
    fn missing_field_message() {
        let diag = Diagnostic::MissingField {
            pattern: "p1".into(),
            field: "MODE".into(),
        };
        assert_eq!(
            diag.to_string(),
            "'mode' is not found in pattern 'p1', use default value."
        );
    }
}
