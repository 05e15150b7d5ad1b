//! HEX pattern codec.
//!
//! One record per 32-bit word: four hex digits of address followed by eight
//! hex digits of value, e.g. `000400000005`.

use std::fmt::Write as _;

use log::debug;
use regmap_core::{pack_words, unpack_word, Diagnostic, Pattern, RegisterTable, ValueError};

/// Length of one record without the line break.
pub const RECORD_LEN: usize = 12;

/// Highest address a record can carry.
pub const MAX_ADDR: u32 = 0xFFFF;

/// Failure rendering a pattern as HEX records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A field value does not fit.
    #[error(transparent)]
    Value(#[from] ValueError),
    /// The table reaches past the 4-digit address field.
    #[error("address {0:#x} does not fit a 4-digit HEX record")]
    AddressRange(u32),
}

/// What went wrong on a HEX record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexErrorKind {
    /// The record is not exactly 12 characters.
    #[error("record must be {RECORD_LEN} hex digits, found {0} characters")]
    Length(usize),
    /// The record holds non-hex characters.
    #[error("record '{0}' is not hexadecimal")]
    Digits(String),
}

/// A malformed HEX record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct HexError {
    /// 1-indexed line number.
    pub line: usize,
    /// Failure detail.
    pub kind: HexErrorKind,
}

/// Packs `pattern` and renders one record per word address.
///
/// # Errors
///
/// Returns [`EncodeError::AddressRange`] before packing if the table's
/// highest address exceeds [`MAX_ADDR`], or the first value failure.
pub fn encode(
    table: &RegisterTable,
    pattern: &Pattern,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<String, EncodeError> {
    if let Some(addr) = table.max_addr().filter(|&addr| addr > MAX_ADDR) {
        return Err(EncodeError::AddressRange(addr));
    }

    let mut out = String::new();
    for word in pack_words(table, pattern, diagnostics)? {
        let _ = writeln!(out, "{:04x}{:08x}", word.addr, word.word);
    }
    Ok(out)
}

/// Unpacks HEX records into a pattern named `name`.
///
/// Every field at a record's address receives its bits as `0x` text.
/// Records for addresses without fields are ignored; blank lines are skipped.
///
/// # Errors
///
/// Returns the first malformed record.
pub fn decode(text: &str, name: &str, table: &RegisterTable) -> Result<Pattern, HexError> {
    let mut pattern = Pattern::new(name);

    for (idx, raw) in text.lines().enumerate() {
        let record = raw.trim();
        if record.is_empty() {
            continue;
        }
        let fail = |kind| HexError {
            line: idx + 1,
            kind,
        };
        if record.len() != RECORD_LEN {
            return Err(fail(HexErrorKind::Length(record.chars().count())));
        }
        let digits = || fail(HexErrorKind::Digits(record.to_string()));
        if !record.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(digits());
        }
        let addr = u32::from_str_radix(&record[..4], 16).map_err(|_| digits())?;
        let word = u32::from_str_radix(&record[4..], 16).map_err(|_| digits())?;
        unpack_word(table, addr, word, &mut pattern);
    }

    debug!("decoded hex pattern: {pattern:#?}");
    Ok(pattern)
}
