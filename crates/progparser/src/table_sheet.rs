//! Sheet schema parser.
//!
//! Rows between the `ADDR` header and the `none` terminator describe
//! fields. Column A opens a new address slot, B titles it, C holds the
//! default value, D the bit range (`msb` or `msb_lsb`) and E the field name
//! followed by comment lines. Sign and access come from font colors as
//! interpreted by the supplied [`ColorMap`].

use std::fmt;

use log::debug;
use regmap_core::{
    numeric, BitField, BitRange, Field, ModelError, NumericError, RegisterTable, RESERVED_NAME,
};

use crate::sheet::{
    ColorMap, Sheet, ADDR_COLUMN, BITS_COLUMN, INIT_COLUMN, MEMBER_COLUMN, TITLE_COLUMN,
};

/// What went wrong in a sheet schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableSheetErrorKind {
    /// No `ADDR` header or `none` terminator in column A.
    #[error("missing 'ADDR' header or 'none' terminator in column A")]
    MissingSentinel,
    /// Column A holds something that is not an address.
    #[error("address syntax error: {0}")]
    Address(NumericError),
    /// A field row appears before any address.
    #[error("field row before the first address")]
    NoAddress,
    /// Columns C, D or E do not describe a field.
    #[error("register syntax error (INI/Bits/Member): {0}")]
    Register(String),
    /// Model invariant violated.
    #[error(transparent)]
    Model(ModelError),
}

/// A sheet schema row that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSheetError {
    /// 1-indexed row, or 0 for sheet-level failures.
    pub row: u32,
    /// Failure detail.
    pub kind: TableSheetErrorKind,
}

impl fmt::Display for TableSheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for TableSheetError {}

/// Parses the schema held in `sheet`.
///
/// # Errors
///
/// Returns the first malformed row. A repeated address is reported as
/// [`ModelError::DuplicateAddress`].
pub fn parse_table(sheet: &Sheet, colors: &ColorMap) -> Result<RegisterTable, TableSheetError> {
    let (first, terminator) = field_block(sheet)?;

    let mut table = RegisterTable::new();
    let mut current: Option<u32> = None;

    for row in first..terminator {
        let fail = |kind| TableSheetError { row, kind };

        if let Some(text) = sheet.text(row, ADDR_COLUMN) {
            let addr =
                numeric::parse_u32(text).map_err(|e| fail(TableSheetErrorKind::Address(e)))?;
            let title = sheet.text(row, TITLE_COLUMN).map(str::to_string);
            table
                .declare_new_slot(addr, title)
                .map_err(|e| fail(TableSheetErrorKind::Model(e)))?;
            current = Some(addr);
        }

        if sheet.text(row, BITS_COLUMN).is_none() && sheet.text(row, MEMBER_COLUMN).is_none() {
            continue;
        }
        let addr = current.ok_or_else(|| fail(TableSheetErrorKind::NoAddress))?;
        let field = parse_field_row(sheet, colors, row, addr).map_err(fail)?;
        table
            .add_field(field)
            .map_err(|e| fail(TableSheetErrorKind::Model(e)))?;
    }

    debug!("parsed sheet table: {table:#?}");
    Ok(table)
}

fn parse_field_row(
    sheet: &Sheet,
    colors: &ColorMap,
    row: u32,
    addr: u32,
) -> Result<Field, TableSheetErrorKind> {
    let range = parse_bits(sheet.text(row, BITS_COLUMN).unwrap_or_default())?;

    let is_signed = colors.is_signed(sheet.font(row, INIT_COLUMN));
    let init_val = match sheet.text(row, INIT_COLUMN) {
        None => 0,
        Some(text) => numeric::parse(text, is_signed, range.width())
            .map_err(|e| TableSheetErrorKind::Register(format!("INI '{text}': {e}")))?,
    };

    let member = sheet.text(row, MEMBER_COLUMN).unwrap_or_default();
    let mut lines = member.split('\n');
    let name = lines.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(TableSheetErrorKind::Register("empty Member".into()));
    }
    let comments: Vec<&str> = lines.map(str::trim).collect();
    let comment = (!comments.is_empty()).then(|| comments.join(", "));
    let is_access = !colors.is_soft(sheet.font(row, MEMBER_COLUMN));

    let bits = BitField::new(addr, range, is_signed, init_val)
        .map_err(|e| TableSheetErrorKind::Register(e.to_string()))?;
    Ok(Field::bits(name, bits, is_access, comment))
}

/// Parses a `msb` or `msb_lsb` bit range cell.
///
/// # Errors
///
/// Returns [`TableSheetErrorKind::Register`] for malformed numbers and
/// [`ModelError::InvalidBitRange`] for out-of-order bits.
pub fn parse_bits(text: &str) -> Result<BitRange, TableSheetErrorKind> {
    let mut parts = text.split('_');
    let bit = |part: Option<&str>| {
        numeric::parse_u32(part.unwrap_or_default())
            .map_err(|e| TableSheetErrorKind::Register(format!("Bits '{text}': {e}")))
    };
    let msb = bit(parts.next())?;
    let lsb = match parts.next() {
        Some(part) => bit(Some(part))?,
        None => msb,
    };
    if parts.next().is_some() {
        return Err(TableSheetErrorKind::Register(format!("Bits '{text}'")));
    }
    BitRange::new(msb, lsb)
        .ok_or(TableSheetErrorKind::Model(ModelError::InvalidBitRange { msb, lsb }))
}

/// Gives every `reserved` member row the soft font, from the member column
/// rightwards, so the next parse treats those fields as inaccessible.
/// Returns the number of rows changed.
///
/// # Errors
///
/// Returns [`TableSheetErrorKind::MissingSentinel`] for a sheet without a
/// field block.
pub fn mask_reserved(sheet: &mut Sheet, colors: &ColorMap) -> Result<usize, TableSheetError> {
    let (first, terminator) = field_block(sheet)?;
    let last_column = sheet.max_column();
    let mut changed = 0;

    for row in first..terminator {
        let is_reserved = sheet
            .text(row, MEMBER_COLUMN)
            .is_some_and(|text| text.eq_ignore_ascii_case(RESERVED_NAME));
        if !is_reserved || colors.is_soft(sheet.font(row, MEMBER_COLUMN)) {
            continue;
        }
        sheet.set_row_font(row, Some(colors.soft));
        for column in MEMBER_COLUMN..=last_column {
            if sheet.cell(row, column).is_some() {
                sheet.set_font(row, column, Some(colors.soft));
            }
        }
        changed += 1;
    }
    Ok(changed)
}

/// Hides every row whose title cell reads `reserved`. Returns the number
/// of rows hidden.
///
/// # Errors
///
/// Returns [`TableSheetErrorKind::MissingSentinel`] for a sheet without a
/// field block.
pub fn hide_reserved(sheet: &mut Sheet) -> Result<usize, TableSheetError> {
    let (first, terminator) = field_block(sheet)?;
    let rows: Vec<u32> = (first..terminator)
        .filter(|&row| {
            sheet
                .text(row, TITLE_COLUMN)
                .is_some_and(|text| text.eq_ignore_ascii_case(RESERVED_NAME))
        })
        .collect();
    for &row in &rows {
        sheet.hide_row(row);
    }
    Ok(rows.len())
}

fn field_block(sheet: &Sheet) -> Result<(u32, u32), TableSheetError> {
    sheet.field_rows().ok_or(TableSheetError {
        row: 0,
        kind: TableSheetErrorKind::MissingSentinel,
    })
}
