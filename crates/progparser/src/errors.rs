//! Unified conversion errors with source locations.
//!
//! Every fatal failure of a run becomes a [`ConvertError`]: a kind plus an
//! optional [`SourceLoc`]. Errors print either as a one-line
//! `path:line: error: ...` message or as the bordered diagnostic block
//! produced by [`ConvertError::format_block`].

use std::fmt;
use std::path::{Path, PathBuf};

use regmap_core::{ModelError, ValueError};

use crate::cache::CacheError;
use crate::hex::{HexError, RECORD_LEN};
use crate::ini::{IniError, LINE_GRAMMAR};
use crate::sheet::SheetError;
use crate::sheet_pattern::SheetPatternError;
use crate::table_sheet::{TableSheetError, TableSheetErrorKind};
use crate::table_text::{TableTextError, TableTextErrorKind};

/// Width of the dashed rule around a diagnostic block.
pub const RULE_WIDTH: usize = 60;

/// Expected layout of a sheet schema row.
pub const SHEET_ROW_GRAMMAR: &str = "A=<addr> B=[title] C=<init_val> D=<msb>[_<lsb>] E=<name>";

/// Position inside a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// 1-indexed text line.
    Line(usize),
    /// 1-indexed sheet row.
    Row(u32),
    /// 1-indexed sheet cell.
    Cell {
        /// Row.
        row: u32,
        /// Column.
        column: u32,
    },
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => write!(f, "line {line}"),
            Self::Row(row) => write!(f, "row {row}"),
            Self::Cell { row, column } => write!(f, "row {row}, column {column}"),
        }
    }
}

/// Source location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// File the error came from.
    pub file: PathBuf,
    /// Position inside the file, when known.
    pub position: Option<Position>,
}

impl SourceLoc {
    /// Creates a location naming a whole file.
    #[must_use]
    pub fn new(file: impl AsRef<Path>) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            position: None,
        }
    }

    /// Sets the position inside the file.
    #[must_use]
    pub const fn with_position(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    /// Formats the location as `path:line` (or `path` if no position).
    #[must_use]
    pub fn format_location(&self) -> String {
        match self.position {
            Some(Position::Line(line)) => format!("{}:{line}", self.file.display()),
            Some(position) => format!("{} ({position})", self.file.display()),
            None => self.file.display().to_string(),
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_location())
    }
}

/// Broad class of a failure, used as the heading of a diagnostic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed schema line or cell.
    TableSyntax,
    /// Malformed pattern line, record or cell.
    PatternSyntax,
    /// A pattern value that does not fit its field.
    RegisterValue,
    /// A schema that contradicts itself across lines.
    SchemaConsistency,
    /// File system failure.
    Io,
    /// Table cache failure.
    Cache,
    /// Bad command-line usage.
    Usage,
}

impl ErrorClass {
    /// Heading printed in diagnostic blocks.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TableSyntax => "TableSyntaxError",
            Self::PatternSyntax => "PatternSyntaxError",
            Self::RegisterValue => "RegisterValueError",
            Self::SchemaConsistency => "SchemaConsistencyError",
            Self::Io => "IoError",
            Self::Cache => "CacheError",
            Self::Usage => "UsageError",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kinds of conversion error.
#[derive(Debug, thiserror::Error)]
pub enum ConvertErrorKind {
    /// Text schema failure.
    #[error(transparent)]
    TableText(TableTextError),
    /// Sheet schema failure.
    #[error(transparent)]
    TableSheet(TableSheetError),
    /// INI pattern failure.
    #[error(transparent)]
    Ini(IniError),
    /// HEX pattern failure.
    #[error(transparent)]
    Hex(HexError),
    /// Sheet pattern failure.
    #[error(transparent)]
    SheetPattern(SheetPatternError),
    /// A pattern value could not be encoded.
    #[error(transparent)]
    RegisterValue(ValueError),
    /// The table reaches past what a HEX record can address.
    #[error("address {0:#x} does not fit a 4-digit HEX record")]
    AddressRange(u32),
    /// A sheet could not be read or written.
    #[error(transparent)]
    Sheet(SheetError),
    /// A table cache could not be read or written.
    #[error(transparent)]
    Cache(CacheError),
    /// Any other file system failure.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Bad command-line usage.
    #[error("{0}")]
    Usage(String),
}

const fn model_class(model: &ModelError) -> ErrorClass {
    match model {
        ModelError::UnknownAddress(_) | ModelError::DuplicateAddress(_) => {
            ErrorClass::SchemaConsistency
        }
        _ => ErrorClass::TableSyntax,
    }
}

impl ConvertErrorKind {
    /// Class of this failure.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::TableText(TableTextError {
                kind: TableTextErrorKind::Model(model),
                ..
            })
            | Self::TableSheet(TableSheetError {
                kind: TableSheetErrorKind::Model(model),
                ..
            }) => model_class(model),
            Self::TableText(_) | Self::TableSheet(_) => ErrorClass::TableSyntax,
            Self::Ini(_) | Self::Hex(_) | Self::SheetPattern(_) => ErrorClass::PatternSyntax,
            Self::RegisterValue(_) | Self::AddressRange(_) => ErrorClass::RegisterValue,
            Self::Sheet(_) | Self::Io { .. } => ErrorClass::Io,
            Self::Cache(_) => ErrorClass::Cache,
            Self::Usage(_) => ErrorClass::Usage,
        }
    }

    /// Position carried by the underlying parse error, if any.
    #[must_use]
    pub const fn position(&self) -> Option<Position> {
        match self {
            Self::TableText(err) => Some(Position::Line(err.line)),
            Self::TableSheet(err) if err.row > 0 => Some(Position::Row(err.row)),
            Self::Ini(err) => Some(Position::Line(err.line)),
            Self::Hex(err) => Some(Position::Line(err.line)),
            Self::SheetPattern(err) if err.row > 0 => Some(Position::Cell {
                row: err.row,
                column: err.column,
            }),
            _ => None,
        }
    }

    /// Expected syntax as `(descriptor, grammar)`, for syntax errors.
    #[must_use]
    pub fn expected_syntax(&self) -> Option<(String, &'static str)> {
        match self {
            Self::TableText(err) if self.class() == ErrorClass::TableSyntax => {
                Some((format!("{} descriptor", err.descriptor), err.descriptor.grammar()))
            }
            Self::TableSheet(_) if self.class() == ErrorClass::TableSyntax => {
                Some(("sheet register row".to_string(), SHEET_ROW_GRAMMAR))
            }
            Self::Ini(_) => Some(("pattern line".to_string(), LINE_GRAMMAR)),
            Self::Hex(_) => Some((
                format!("{RECORD_LEN}-digit record"),
                "<addr:4 hex digits><word:8 hex digits>",
            )),
            _ => None,
        }
    }
}

/// A conversion error with an optional source location.
#[derive(Debug)]
pub struct ConvertError {
    /// The kind of error.
    pub kind: ConvertErrorKind,
    /// Where it happened.
    pub location: Option<SourceLoc>,
}

impl ConvertError {
    /// Creates an error without location.
    #[must_use]
    pub const fn new(kind: ConvertErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Creates an error located in `file`, at the position the kind carries.
    #[must_use]
    pub fn in_file(kind: ConvertErrorKind, file: impl AsRef<Path>) -> Self {
        let position = kind.position();
        Self {
            kind,
            location: Some(SourceLoc::new(file).with_position(position)),
        }
    }

    /// Creates a usage error.
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ConvertErrorKind::Usage(message.into()))
    }

    /// Creates an I/O error for `path`.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::new(ConvertErrorKind::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// Class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    /// Formats the error as one line for stderr.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        match &self.location {
            Some(loc) => format!("{}: error: {}", loc.format_location(), self.kind),
            None => format!("error: {}", self.kind),
        }
    }

    /// Formats the error as a bordered diagnostic block.
    ///
    /// ```text
    /// ------------------------------------------------------------
    /// TableSyntaxError: (table.txt:3)
    /// syntax of register descriptor:
    ///   '<name> <addr> <msb> <lsb> <sign_type> <is_access> <init_val> [comment]'
    /// access flag must be 'y' or 'n', found 'x'
    /// ------------------------------------------------------------
    /// ```
    #[must_use]
    pub fn format_block(&self) -> String {
        let rule = "-".repeat(RULE_WIDTH);
        let mut lines = vec![rule.clone()];
        match &self.location {
            Some(loc) => lines.push(format!("{}: ({loc})", self.class())),
            None => lines.push(format!("{}:", self.class())),
        }
        if let Some((descriptor, grammar)) = self.kind.expected_syntax() {
            lines.push(format!("syntax of {descriptor}:"));
            lines.push(format!("  '{grammar}'"));
        }
        let detail = match &self.kind {
            ConvertErrorKind::RegisterValue(err) => {
                lines.push(format!("pattern:  {}", err.pattern()));
                lines.push(format!("register: {}", err.field()));
                match err {
                    ValueError::Numeric { source, .. } => source.to_string(),
                    ValueError::Scalar { kind, text, .. } => {
                        format!("'{text}' is not a valid {kind} value")
                    }
                }
            }
            ConvertErrorKind::TableText(err) => err.kind.to_string(),
            ConvertErrorKind::Ini(err) => err.kind.to_string(),
            ConvertErrorKind::Hex(err) => err.kind.to_string(),
            ConvertErrorKind::SheetPattern(err) => err.kind.to_string(),
            other => other.to_string(),
        };
        lines.push(detail);
        lines.push(rule);
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<ConvertErrorKind> for ConvertError {
    fn from(kind: ConvertErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ValueError> for ConvertError {
    fn from(err: ValueError) -> Self {
        Self::new(ConvertErrorKind::RegisterValue(err))
    }
}

impl From<crate::hex::EncodeError> for ConvertError {
    fn from(err: crate::hex::EncodeError) -> Self {
        match err {
            crate::hex::EncodeError::Value(err) => err.into(),
            crate::hex::EncodeError::AddressRange(addr) => {
                Self::new(ConvertErrorKind::AddressRange(addr))
            }
        }
    }
}

impl From<SheetError> for ConvertError {
    fn from(err: SheetError) -> Self {
        Self::new(ConvertErrorKind::Sheet(err))
    }
}

impl From<CacheError> for ConvertError {
    fn from(err: CacheError) -> Self {
        Self::new(ConvertErrorKind::Cache(err))
    }
}

/// A collection of errors from one run.
#[derive(Debug, Default)]
pub struct ErrorCollection {
    errors: Vec<ConvertError>,
}

impl ErrorCollection {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Adds an error.
    pub fn push(&mut self, error: ConvertError) {
        self.errors.push(error);
    }

    /// Returns true if there are no errors.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns an iterator over the errors.
    pub fn iter(&self) -> impl Iterator<Item = &ConvertError> {
        self.errors.iter()
    }

    /// Formats every error as a diagnostic block.
    #[must_use]
    pub fn format_blocks(&self) -> String {
        self.errors.iter().map(ConvertError::format_block).collect()
    }
}

impl fmt::Display for ErrorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorCollection {}

impl FromIterator<ConvertError> for ErrorCollection {
    fn from_iter<T: IntoIterator<Item = ConvertError>>(iter: T) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_text::parse_table;

    #[test]
    fn table_syntax_block_names_grammar() {
        let err = parse_table("enable 0x0 0 0 u x 0\n").unwrap_err();
        let err = ConvertError::in_file(ConvertErrorKind::TableText(err), "table.txt");

        assert_eq!(err.class(), ErrorClass::TableSyntax);
        let rule = "-".repeat(RULE_WIDTH);
        let expected = format!(
            "{rule}\n\
             TableSyntaxError: (table.txt:1)\n\
             syntax of register descriptor:\n\
             \x20 '<name> <addr> <msb> <lsb> <sign_type> <is_access> <init_val> [comment]'\n\
             access flag must be 'y' or 'n', found 'x'\n\
             {rule}\n"
        );
        assert_eq!(err.format_block(), expected);
    }

    #[test]
    fn undeclared_insert_is_schema_consistency() {
        let err = parse_table("T: core\nI: 0x40\n").unwrap_err();
        let err = ConvertError::in_file(ConvertErrorKind::TableText(err), "table.txt");
        assert_eq!(err.class(), ErrorClass::SchemaConsistency);
        assert!(!err.format_block().contains("syntax of"));
    }

    #[test]
    fn value_block_names_pattern_and_register() {
        let err = ConvertError::from(ValueError::Scalar {
            pattern: "p1".to_string(),
            field: "RATIO".to_string(),
            kind: "float",
            text: "abc".to_string(),
        });
        let block = err.format_block();
        assert!(block.contains("RegisterValueError:\n"));
        assert!(block.contains("pattern:  p1\n"));
        assert!(block.contains("register: RATIO\n"));
        assert!(block.contains("'abc' is not a valid float value\n"));
    }

    #[test]
    fn stderr_line_uses_location() {
        let err = crate::ini::decode("a = 1\nbogus\n", "p").unwrap_err();
        let err = ConvertError::in_file(ConvertErrorKind::Ini(err), "p.ini");
        assert_eq!(err.format_for_stderr(), "p.ini:2: error: line 2: missing '='");
        assert_eq!(err.class(), ErrorClass::PatternSyntax);
    }

    #[test]
    fn collection_basics() {
        let mut errors = ErrorCollection::new();
        assert!(errors.is_empty());
        errors.push(ConvertError::usage("missing table"));
        errors.push(ConvertError::from(crate::hex::EncodeError::AddressRange(0x1_0000)));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.iter().next().map(ConvertError::class), Some(ErrorClass::Usage));
        assert_eq!(
            errors.to_string(),
            "missing table\naddress 0x10000 does not fit a 4-digit HEX record"
        );
    }
}
