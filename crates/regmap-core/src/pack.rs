//! Value resolution and word packing.
//!
//! Every encoder funnels through [`resolve_field`], so the default fallback,
//! the access rule and the numeric validation behave the same whatever the
//! output format. Packing a slot ORs each field's masked value into place;
//! addresses without a slot pack to zero.

use log::warn;
use thiserror::Error;

use crate::field::{strip_quotes, BitField, Field, FieldKind, ScalarKind};
use crate::numeric::{self, NumericError};
use crate::pattern::{Diagnostic, Pattern, PatternValue};
use crate::table::{AddressSlot, RegisterTable};

/// A pattern value that cannot be used for its field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Numeric conversion failed for a bit field.
    #[error("field '{field}' in pattern '{pattern}': {source}")]
    Numeric {
        /// Pattern name.
        pattern: String,
        /// Canonical field name.
        field: String,
        /// Underlying codec failure.
        #[source]
        source: NumericError,
    },
    /// A scalar value of the wrong kind.
    #[error("field '{field}' in pattern '{pattern}': '{text}' is not a valid {kind} value")]
    Scalar {
        /// Pattern name.
        pattern: String,
        /// Canonical field name.
        field: String,
        /// Expected scalar kind.
        kind: &'static str,
        /// Offending text.
        text: String,
    },
}

impl ValueError {
    /// Name of the pattern that failed.
    #[must_use]
    pub fn pattern(&self) -> &str {
        match self {
            Self::Numeric { pattern, .. } | Self::Scalar { pattern, .. } => pattern,
        }
    }

    /// Name of the field that failed.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Numeric { field, .. } | Self::Scalar { field, .. } => field,
        }
    }
}

/// A validated value ready for rendering or packing.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Bit-field value in the field's domain.
    Bits(i64),
    /// String scalar without quotes.
    Str(String),
    /// Float scalar.
    Float(f64),
    /// Int scalar.
    Int(i64),
}

/// One packed 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedWord {
    /// Word address.
    pub addr: u32,
    /// Packed value.
    pub word: u32,
}

/// Resolves the value `pattern` supplies for `field`.
///
/// Inaccessible fields always yield their default. Absent fields yield their
/// default and record a [`Diagnostic::MissingField`].
///
/// # Errors
///
/// Returns [`ValueError`] when the supplied value does not fit the field.
pub fn resolve_field(
    field: &Field,
    pattern: &Pattern,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<FieldValue, ValueError> {
    let supplied = if field.is_access {
        pattern.get(&field.name)
    } else {
        None
    };

    if supplied.is_none() && field.is_access {
        let diagnostic = Diagnostic::MissingField {
            pattern: pattern.name.clone(),
            field: field.name.clone(),
        };
        warn!("{diagnostic}");
        diagnostics.push(diagnostic);
    }

    match &field.kind {
        FieldKind::Bits(bits) => supplied
            .map_or(Ok(bits.init_val), |value| bit_value(field, bits, pattern, value))
            .map(FieldValue::Bits),
        FieldKind::Scalar(kind) => Ok(match supplied {
            None => default_scalar(kind),
            Some(value) => scalar_value(field, kind, pattern, value)?,
        }),
    }
}

fn bit_value(
    field: &Field,
    bits: &BitField,
    pattern: &Pattern,
    value: &PatternValue,
) -> Result<i64, ValueError> {
    let result = match value {
        PatternValue::Text(text) => bits.parse_value(text),
        PatternValue::Int(value) => numeric::check_range(*value, bits.is_signed, bits.width()),
    };
    result.map_err(|source| ValueError::Numeric {
        pattern: pattern.name.clone(),
        field: field.name.clone(),
        source,
    })
}

fn default_scalar(kind: &ScalarKind) -> FieldValue {
    match kind {
        ScalarKind::Str { init, .. } => FieldValue::Str(init.clone()),
        ScalarKind::Float(init) => FieldValue::Float(*init),
        ScalarKind::Int(init) => FieldValue::Int(*init),
    }
}

#[allow(clippy::cast_precision_loss)]
fn scalar_value(
    field: &Field,
    kind: &ScalarKind,
    pattern: &Pattern,
    value: &PatternValue,
) -> Result<FieldValue, ValueError> {
    let invalid = |text: &str| ValueError::Scalar {
        pattern: pattern.name.clone(),
        field: field.name.clone(),
        kind: kind.keyword(),
        text: text.to_string(),
    };

    match (kind, value) {
        (ScalarKind::Str { .. }, PatternValue::Text(text)) => {
            Ok(FieldValue::Str(strip_quotes(text).to_string()))
        }
        (ScalarKind::Str { .. }, PatternValue::Int(v)) => Ok(FieldValue::Str(v.to_string())),
        (ScalarKind::Float(_), PatternValue::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|_| invalid(text)),
        (ScalarKind::Float(_), PatternValue::Int(v)) => Ok(FieldValue::Float(*v as f64)),
        (ScalarKind::Int(_), PatternValue::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| invalid(text)),
        (ScalarKind::Int(_), PatternValue::Int(v)) => Ok(FieldValue::Int(*v)),
    }
}

/// Packs the fields of one slot into a word.
///
/// # Errors
///
/// Returns the first [`ValueError`] raised by a field of the slot.
pub fn pack_slot(
    table: &RegisterTable,
    slot: &AddressSlot,
    pattern: &Pattern,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<u32, ValueError> {
    let mut word = 0u32;
    for &id in &slot.fields {
        let field = table.field(id);
        if let (Some(bits), FieldValue::Bits(value)) =
            (field.as_bits(), resolve_field(field, pattern, diagnostics)?)
        {
            word |= bits.range.place(value);
        }
    }
    Ok(word)
}

/// Packs `pattern` into one word per address from 0 to the highest declared
/// address, stepping by 4. Addresses without a slot pack to zero.
///
/// # Errors
///
/// Returns the first [`ValueError`]; no words are produced in that case.
pub fn pack_words(
    table: &RegisterTable,
    pattern: &Pattern,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<PackedWord>, ValueError> {
    table
        .word_addresses()
        .map(|addr| {
            let word = match table.slot(addr) {
                Some(slot) => pack_slot(table, slot, pattern, diagnostics)?,
                None => 0,
            };
            Ok(PackedWord { addr, word })
        })
        .collect()
}

/// Stores the bits of `word` for every field at `addr` into `pattern` as
/// `0x` hex text.
pub fn unpack_word(table: &RegisterTable, addr: u32, word: u32, pattern: &mut Pattern) {
    for (field, bits) in table.bit_fields_at(addr) {
        let raw = bits.range.extract(word);
        pattern.set(&field.name, PatternValue::Text(format!("{raw:#x}")));
    }
}
