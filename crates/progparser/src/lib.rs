//! Register-map compiler: reads a register table from a text or sheet
//! schema and converts register patterns between INI, HEX and sheet form.

use simple_logger as _;

/// Serialized table cache.
pub mod cache;
/// Field-by-field table comparison.
pub mod compare;
/// Pattern conversion pipeline.
pub mod convert;
/// Located errors and diagnostic blocks.
pub mod errors;
/// Schema export to text, sheet and initial INI.
pub mod export;
/// HEX pattern codec.
pub mod hex;
/// INI pattern codec.
pub mod ini;
/// Spreadsheet grid of styled cells.
pub mod sheet;
/// Sheet pattern codec.
pub mod sheet_pattern;
/// Batch lists and range selection.
pub mod source;
/// Sheet schema parser and reserved-row maintenance.
pub mod table_sheet;
/// Text schema parser.
pub mod table_text;

#[cfg(test)]
use proptest as _;
