//! Sheet pattern codec: one pattern per column from column F onward.
//!
//! Row 1 of a pattern column holds its index, row 2 its name, and each
//! field row the field's bits in upper-case hex without prefix. A name cell
//! in the soft font marks a column to skip.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use log::debug;
use regmap_core::field::canonical_name;
use regmap_core::{
    mask, numeric, resolve_field, Diagnostic, FieldValue, Pattern, PatternValue, RegisterTable,
    ValueError, RESERVED_NAME,
};

use crate::sheet::{
    ColorMap, Sheet, ADDR_COLUMN, BITS_COLUMN, FIRST_PATTERN_COLUMN, MEMBER_COLUMN,
};
use crate::source::RangeSpec;
use crate::table_sheet::parse_bits;

/// Row holding the pattern column index.
pub const INDEX_ROW: u32 = 1;
/// Row holding the pattern name.
pub const NAME_ROW: u32 = 2;

/// What went wrong in a pattern column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetPatternErrorKind {
    /// No `ADDR` header or `none` terminator in column A.
    #[error("missing 'ADDR' header or 'none' terminator in column A")]
    MissingSentinel,
    /// A value cell that is not hexadecimal.
    #[error("value '{0}' is not hexadecimal")]
    Digits(String),
}

/// A malformed pattern cell.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row}, column {column}: {kind}")]
pub struct SheetPatternError {
    /// 1-indexed row, or 0 for sheet-level failures.
    pub row: u32,
    /// 1-indexed column.
    pub column: u32,
    /// Failure detail.
    pub kind: SheetPatternErrorKind,
}

/// Which pattern columns to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnSelection {
    /// Read a range of columns instead of a single one.
    pub batch: bool,
    /// Column bounds.
    pub range: RangeSpec,
}

impl ColumnSelection {
    /// Columns selected on a sheet whose last column is `max_column`.
    #[must_use]
    pub fn columns(&self, max_column: u32) -> RangeInclusive<u32> {
        let clamped = if self.batch {
            self.range.clamp(FIRST_PATTERN_COLUMN, max_column)
        } else {
            self.range.clamp_single(FIRST_PATTERN_COLUMN, max_column)
        };
        clamped.unwrap_or(1..=0)
    }
}

fn member_name(sheet: &Sheet, row: u32) -> Option<String> {
    sheet
        .text(row, MEMBER_COLUMN)
        .and_then(|text| text.lines().next())
        .map(canonical_name)
        .filter(|name| !name.is_empty())
}

/// Reads the pattern held in `column`.
///
/// Returns `Ok(None)` for a column without a name or whose name cell uses
/// the soft font. `RESERVED` rows and empty cells are left out, so those
/// fields take their default when the pattern is encoded.
///
/// # Errors
///
/// Returns [`SheetPatternError`] for a sheet without sentinels or a value
/// cell that is not hexadecimal.
pub fn decode_column(
    sheet: &Sheet,
    colors: &ColorMap,
    column: u32,
) -> Result<Option<Pattern>, SheetPatternError> {
    let Some(name) = sheet.text(NAME_ROW, column) else {
        return Ok(None);
    };
    if colors.is_soft(sheet.font(NAME_ROW, column)) {
        debug!("skipping soft column {column} ('{name}')");
        return Ok(None);
    }
    let (first, terminator) = sheet.field_rows().ok_or(SheetPatternError {
        row: 0,
        column,
        kind: SheetPatternErrorKind::MissingSentinel,
    })?;

    let mut pattern = Pattern::new(name);
    for row in first..terminator {
        let Some(field) = member_name(sheet, row) else {
            continue;
        };
        if field == RESERVED_NAME {
            continue;
        }
        let Some(value) = sheet.text(row, column) else {
            continue;
        };
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SheetPatternError {
                row,
                column,
                kind: SheetPatternErrorKind::Digits(value.to_string()),
            });
        }
        pattern.set(&field, PatternValue::Text(format!("0x{digits}")));
    }

    debug!("decoded sheet pattern: {pattern:#?}");
    Ok(Some(pattern))
}

/// Field rows of a sheet, located by address and bit range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    rows: BTreeMap<(u32, u32, u32), u32>,
    reserved_rows: Vec<u32>,
    next_column: u32,
}

impl SheetLayout {
    /// Scans the field rows of `sheet`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetPatternErrorKind::MissingSentinel`] if the sheet has no
    /// field block.
    pub fn scan(sheet: &Sheet) -> Result<Self, SheetPatternError> {
        let (first, terminator) = sheet.field_rows().ok_or(SheetPatternError {
            row: 0,
            column: 0,
            kind: SheetPatternErrorKind::MissingSentinel,
        })?;

        let mut rows = BTreeMap::new();
        let mut reserved_rows = Vec::new();
        let mut addr = None;
        for row in first..terminator {
            if let Some(text) = sheet.text(row, ADDR_COLUMN) {
                addr = numeric::parse_u32(text).ok();
            }
            if member_name(sheet, row).as_deref() == Some(RESERVED_NAME) {
                reserved_rows.push(row);
                continue;
            }
            let range = sheet.text(row, BITS_COLUMN).and_then(|t| parse_bits(t).ok());
            if let (Some(addr), Some(range)) = (addr, range) {
                rows.insert((addr, range.msb(), range.lsb()), row);
            }
        }

        Ok(Self {
            rows,
            reserved_rows,
            next_column: (sheet.max_column() + 1).max(FIRST_PATTERN_COLUMN),
        })
    }

    /// Column the next appended pattern goes to.
    #[must_use]
    pub const fn next_column(&self) -> u32 {
        self.next_column
    }
}

/// Removes every pattern column, leaving the schema columns.
pub fn prepare_fresh(sheet: &mut Sheet) {
    sheet.delete_columns_from(FIRST_PATTERN_COLUMN);
}

/// Appends `pattern` as a new column and returns its index.
///
/// Rows are matched by address and bit range. Inaccessible fields write
/// their masked default; `RESERVED` rows write 0; rows without a matching
/// field stay empty.
///
/// # Errors
///
/// Returns the first [`ValueError`]; the sheet is untouched in that case.
pub fn append_pattern(
    sheet: &mut Sheet,
    layout: &mut SheetLayout,
    table: &RegisterTable,
    pattern: &Pattern,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<u32, ValueError> {
    let mut cells = Vec::new();
    for slot in table.slots_by_address() {
        for (field, bits) in table.bit_fields_at(slot.addr) {
            if field.is_reserved() {
                continue;
            }
            let FieldValue::Bits(value) = resolve_field(field, pattern, diagnostics)? else {
                continue;
            };
            let key = (slot.addr, bits.range.msb(), bits.range.lsb());
            match layout.rows.get(&key) {
                Some(&row) => cells.push((row, format!("{:X}", mask(value, bits.width())))),
                None => debug!("no sheet row for field '{}' at {:#x}", field.name, slot.addr),
            }
        }
    }
    cells.extend(layout.reserved_rows.iter().map(|&row| (row, "0".to_string())));

    let column = layout.next_column;
    sheet.put(INDEX_ROW, column, column.to_string(), None);
    sheet.put(NAME_ROW, column, pattern.name.clone(), None);
    for (row, text) in cells {
        let font = sheet.row_font(row);
        sheet.put(row, column, text, font);
    }
    layout.next_column += 1;
    Ok(column)
}
