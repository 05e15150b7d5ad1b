//! In-memory spreadsheet grid of styled cells.
//!
//! A sheet is a sparse map of 1-based `(row, column)` cells. Each cell holds
//! a text value and an optional font color; rows may also carry a default
//! font. Sheets persist as `.xlsx` workbooks (first worksheet only) or, for
//! any other extension, as a JSON grid.
//!
//! Sign and access flags are encoded by font color in the sheet dialect.
//! That mapping lives only in [`ColorMap`], which parsers receive as a
//! parameter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First column holding pattern values.
pub const FIRST_PATTERN_COLUMN: u32 = 6;
/// Column of addresses.
pub const ADDR_COLUMN: u32 = 1;
/// Column of slot titles.
pub const TITLE_COLUMN: u32 = 2;
/// Column of default values.
pub const INIT_COLUMN: u32 = 3;
/// Column of bit ranges.
pub const BITS_COLUMN: u32 = 4;
/// Column of field names and comments.
pub const MEMBER_COLUMN: u32 = 5;
/// Header sentinel in the address column.
pub const HEADER_SENTINEL: &str = "ADDR";
/// Terminator sentinel in the address column.
pub const TERMINATOR_SENTINEL: &str = "none";

/// ARGB font color, e.g. `ff0000ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(u32);

impl Rgb {
    /// Opaque blue.
    pub const BLUE: Self = Self(0xff00_00ff);
    /// Mid grey.
    pub const GREY: Self = Self(0xff80_8080);

    /// Builds a color from its ARGB value.
    #[must_use]
    pub const fn new(argb: u32) -> Self {
        Self(argb)
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        if digits.len() != 8 {
            return Err(format!("color '{s}' must have 8 hex digits"));
        }
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| format!("color '{s}' is not hexadecimal"))
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Font colors that carry meaning in the sheet dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMap {
    /// Font of a default-value cell holding a signed field.
    pub signed: Rgb,
    /// Font of a member cell holding an inaccessible field, or of a pattern
    /// name cell whose column must be skipped.
    pub soft: Rgb,
}

impl Default for ColorMap {
    fn default() -> Self {
        Self {
            signed: Rgb::BLUE,
            soft: Rgb::GREY,
        }
    }
}

impl ColorMap {
    /// Whether `font` marks a signed field.
    #[must_use]
    pub fn is_signed(&self, font: Option<Rgb>) -> bool {
        font == Some(self.signed)
    }

    /// Whether `font` is the soft (grey) color.
    #[must_use]
    pub fn is_soft(&self, font: Option<Rgb>) -> bool {
        font == Some(self.soft)
    }
}

/// One styled cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell text.
    pub value: String,
    /// Font color, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<Rgb>,
}

/// Failure reading or writing a sheet file.
#[derive(Debug, Error)]
pub enum SheetError {
    /// The file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// Sheet path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The workbook could not be read or written.
    #[error("{}: {message}", path.display())]
    Workbook {
        /// Workbook path.
        path: PathBuf,
        /// Failure reported by the xlsx reader or writer.
        message: String,
    },
    /// The file is not a valid sheet document.
    #[error("{}: {source}", path.display())]
    Json {
        /// Sheet path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A single worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    #[serde(default)]
    cells: BTreeMap<u32, BTreeMap<u32, Cell>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    row_fonts: BTreeMap<u32, Rgb>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    hidden_rows: BTreeSet<u32>,
}

impl Sheet {
    /// Creates an empty sheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a sheet from a workbook or a JSON file, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SheetError> {
        if is_workbook(path) {
            return read_workbook(path);
        }
        let text = fs::read_to_string(path).map_err(|source| SheetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SheetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the sheet as a workbook or as pretty-printed JSON, chosen by
    /// extension.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError`] if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), SheetError> {
        if is_workbook(path) {
            return write_workbook(self, path);
        }
        let text = self.to_json().map_err(|source| SheetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| SheetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serializes the sheet to JSON text.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self).map(|mut text| {
            text.push('\n');
            text
        })
    }

    /// The cell at `(row, column)`, if present.
    #[must_use]
    pub fn cell(&self, row: u32, column: u32) -> Option<&Cell> {
        self.cells.get(&row).and_then(|cells| cells.get(&column))
    }

    /// Trimmed, non-empty text at `(row, column)`.
    #[must_use]
    pub fn text(&self, row: u32, column: u32) -> Option<&str> {
        self.cell(row, column)
            .map(|cell| cell.value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Font color of the cell at `(row, column)`.
    #[must_use]
    pub fn font(&self, row: u32, column: u32) -> Option<Rgb> {
        self.cell(row, column).and_then(|cell| cell.font)
    }

    /// Sets the text of a cell, keeping its font.
    pub fn set_value(&mut self, row: u32, column: u32, value: impl Into<String>) {
        self.cells
            .entry(row)
            .or_default()
            .entry(column)
            .or_default()
            .value = value.into();
    }

    /// Sets the font of a cell, creating it if needed.
    pub fn set_font(&mut self, row: u32, column: u32, font: Option<Rgb>) {
        self.cells
            .entry(row)
            .or_default()
            .entry(column)
            .or_default()
            .font = font;
    }

    /// Sets text and font of a cell.
    pub fn put(&mut self, row: u32, column: u32, value: impl Into<String>, font: Option<Rgb>) {
        self.cells.entry(row).or_default().insert(
            column,
            Cell {
                value: value.into(),
                font,
            },
        );
    }

    /// Default font of a row.
    #[must_use]
    pub fn row_font(&self, row: u32) -> Option<Rgb> {
        self.row_fonts.get(&row).copied()
    }

    /// Sets or clears the default font of a row.
    pub fn set_row_font(&mut self, row: u32, font: Option<Rgb>) {
        match font {
            Some(font) => {
                self.row_fonts.insert(row, font);
            }
            None => {
                self.row_fonts.remove(&row);
            }
        }
    }

    /// Hides a row.
    pub fn hide_row(&mut self, row: u32) {
        self.hidden_rows.insert(row);
    }

    /// Whether a row is hidden.
    #[must_use]
    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.hidden_rows.contains(&row)
    }

    /// Highest row holding a cell, or 0 for an empty sheet.
    #[must_use]
    pub fn max_row(&self) -> u32 {
        self.cells.keys().next_back().copied().unwrap_or(0)
    }

    /// Highest column holding a cell, or 0 for an empty sheet.
    #[must_use]
    pub fn max_column(&self) -> u32 {
        self.cells
            .values()
            .filter_map(|cells| cells.keys().next_back().copied())
            .max()
            .unwrap_or(0)
    }

    /// Removes every cell in `first` and the columns to its right.
    pub fn delete_columns_from(&mut self, first: u32) {
        for cells in self.cells.values_mut() {
            cells.retain(|&column, _| column < first);
        }
        self.cells.retain(|_, cells| !cells.is_empty());
    }

    /// First row at or after `from` whose cell in `column` equals `text`.
    #[must_use]
    pub fn find_in_column(&self, column: u32, text: &str, from: u32) -> Option<u32> {
        self.cells
            .range(from..)
            .find(|(_, cells)| {
                cells
                    .get(&column)
                    .is_some_and(|cell| cell.value.trim() == text)
            })
            .map(|(&row, _)| row)
    }

    /// Row range strictly between the `ADDR` header and the `none`
    /// terminator, as `(first, terminator)`.
    #[must_use]
    pub fn field_rows(&self) -> Option<(u32, u32)> {
        let header = self.find_in_column(ADDR_COLUMN, HEADER_SENTINEL, 1)?;
        let terminator = self.find_in_column(ADDR_COLUMN, TERMINATOR_SENTINEL, header + 1)?;
        Some((header + 1, terminator))
    }
}

/// Whether `path` names an Excel workbook.
#[must_use]
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm"))
}

fn workbook_error(path: &Path, message: impl fmt::Display) -> SheetError {
    SheetError::Workbook {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn font_color(font: Option<&umya_spreadsheet::Font>) -> Option<Rgb> {
    font.and_then(|font| font.get_color().get_argb().parse().ok())
}

fn argb(color: Rgb) -> String {
    format!("{:08X}", color.0)
}

fn read_workbook(path: &Path) -> Result<Sheet, SheetError> {
    let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| workbook_error(path, e))?;
    let worksheet = book
        .get_sheet(&0)
        .ok_or_else(|| workbook_error(path, "workbook has no worksheet"))?;

    let mut sheet = Sheet::new();
    for cell in worksheet.get_cell_collection() {
        let coordinate = cell.get_coordinate();
        sheet.put(
            *coordinate.get_row_num(),
            *coordinate.get_col_num(),
            cell.get_value().to_string(),
            font_color(cell.get_style().get_font()),
        );
    }
    for row in worksheet.get_row_dimensions() {
        let index = *row.get_row_num();
        if *row.get_hidden() {
            sheet.hide_row(index);
        }
        sheet.set_row_font(index, font_color(row.get_style().get_font()));
    }
    Ok(sheet)
}

fn write_workbook(sheet: &Sheet, path: &Path) -> Result<(), SheetError> {
    let mut book = umya_spreadsheet::new_file();
    let worksheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| workbook_error(path, "workbook has no worksheet"))?;

    for (&row, cells) in &sheet.cells {
        for (&column, cell) in cells {
            let target = worksheet.get_cell_mut((column, row));
            target.set_value_string(cell.value.clone());
            if let Some(font) = cell.font {
                target
                    .get_style_mut()
                    .get_font_mut()
                    .get_color_mut()
                    .set_argb(argb(font));
            }
        }
    }
    for (&row, &font) in &sheet.row_fonts {
        worksheet
            .get_row_dimension_mut(&row)
            .get_style_mut()
            .get_font_mut()
            .get_color_mut()
            .set_argb(argb(font));
    }
    for &row in &sheet.hidden_rows {
        worksheet.get_row_dimension_mut(&row).set_hidden(true);
    }

    umya_spreadsheet::writer::xlsx::write(&book, path).map_err(|e| workbook_error(path, e))
}
