//! Pattern conversion pipeline.
//!
//! A run loads one register table, reads every selected pattern, and writes
//! each of them in the output format. A pattern that fails to read or
//! encode is reported and skipped; the others are still converted. Outputs
//! are rendered in memory before anything is written, so a failed pattern
//! never leaves a partial file behind.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use regmap_core::{Diagnostic, Pattern, RegisterTable};

use crate::errors::{ConvertError, ConvertErrorKind, ErrorCollection};
use crate::sheet::{is_workbook, ColorMap, Sheet};
use crate::sheet_pattern::{self, ColumnSelection, SheetLayout};
use crate::source::{self, RangeSpec};
use crate::{cache, hex, ini, table_sheet, table_text};

/// Default output directory.
pub const DEFAULT_OUT_DIR: &str = "progp_out";

/// File name of a sheet written into an output directory.
pub const SHEET_OUT_NAME: &str = "register.sheet.json";
/// Sheet output file name when the reference sheet is a workbook.
pub const WORKBOOK_OUT_NAME: &str = "register.xlsx";

/// Where the register table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    /// Text schema.
    Text(PathBuf),
    /// Sheet schema. With `fresh`, sheet output drops the existing pattern
    /// columns instead of appending after them.
    Sheet {
        /// Sheet path.
        path: PathBuf,
        /// Start sheet output from an empty pattern area.
        fresh: bool,
    },
    /// Table cache written by [`cache::save`].
    Cache(PathBuf),
}

impl TableSource {
    /// Path of the table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Text(path) | Self::Sheet { path, .. } | Self::Cache(path) => path,
        }
    }
}

/// Loads the register table described by `source`.
///
/// # Errors
///
/// Returns a located [`ConvertError`] if the file cannot be read or does
/// not hold a valid schema.
pub fn load_table(source: &TableSource, colors: &ColorMap) -> Result<RegisterTable, ConvertError> {
    let path = source.path();
    let table = match source {
        TableSource::Text(_) => {
            let text = read_text(path)?;
            table_text::parse_table(&text)
                .map_err(|e| ConvertError::in_file(ConvertErrorKind::TableText(e), path))?
        }
        TableSource::Sheet { .. } => {
            let sheet = Sheet::load(path)?;
            table_sheet::parse_table(&sheet, colors)
                .map_err(|e| ConvertError::in_file(ConvertErrorKind::TableSheet(e), path))?
        }
        TableSource::Cache(_) => cache::load(path)?,
    };
    info!(
        "loaded {} fields at {} addresses from {}",
        table.field_count(),
        table.slots().len(),
        path.display()
    );
    Ok(table)
}

/// Pattern file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFormat {
    /// `name = value` text.
    Ini,
    /// Fixed-width word records.
    Hex,
    /// One pattern per sheet column.
    Sheet,
}

impl PatternFormat {
    /// Extension of a pattern file written in this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Ini => "ini",
            Self::Hex => "pat",
            Self::Sheet => "json",
        }
    }
}

impl FromStr for PatternFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ini" => Ok(Self::Ini),
            "hex" => Ok(Self::Hex),
            "xlsx" | "sheet" => Ok(Self::Sheet),
            _ => Err(format!("unknown pattern format '{s}' (expected ini, hex or sheet)")),
        }
    }
}

impl fmt::Display for PatternFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ini => "ini",
            Self::Hex => "hex",
            Self::Sheet => "sheet",
        })
    }
}

/// Where converted patterns go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// One file per pattern inside this directory, created if missing.
    Dir(PathBuf),
    /// A single output file.
    File {
        /// Output path.
        path: PathBuf,
        /// Replace an existing file.
        overwrite: bool,
    },
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self::Dir(PathBuf::from(DEFAULT_OUT_DIR))
    }
}

/// Settings of one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Input pattern format.
    pub input: PatternFormat,
    /// Output pattern format.
    pub output: PatternFormat,
    /// Pattern file, batch list file, or pattern sheet.
    pub pattern_in: PathBuf,
    /// Read several patterns instead of one.
    pub batch: bool,
    /// Batch rows or sheet columns to read.
    pub range: RangeSpec,
    /// Output destination.
    pub target: OutputTarget,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct ConvertReport {
    /// Files written, in order.
    pub written: Vec<PathBuf>,
    /// Fields that fell back to their defaults.
    pub diagnostics: Vec<Diagnostic>,
    /// Patterns that failed.
    pub errors: ErrorCollection,
}

impl ConvertReport {
    /// True when every selected pattern was converted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

fn read_text(path: &Path) -> Result<String, ConvertError> {
    fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))
}

/// Reads the patterns selected by `options`.
///
/// Pattern-level failures are collected into the returned
/// [`ErrorCollection`] and the remaining patterns are still read.
///
/// # Errors
///
/// Returns an error if the pattern source itself (a batch list or a pattern
/// sheet) cannot be read.
pub fn read_patterns(
    table: &RegisterTable,
    options: &ConvertOptions,
    colors: &ColorMap,
) -> Result<(Vec<Pattern>, ErrorCollection), ConvertError> {
    let mut patterns = Vec::new();
    let mut errors = ErrorCollection::new();

    if options.input == PatternFormat::Sheet {
        let sheet = Sheet::load(&options.pattern_in)?;
        let selection = ColumnSelection {
            batch: options.batch,
            range: options.range,
        };
        for column in selection.columns(sheet.max_column()) {
            match sheet_pattern::decode_column(&sheet, colors, column) {
                Ok(Some(pattern)) => patterns.push(pattern),
                Ok(None) => {}
                Err(e) => errors.push(ConvertError::in_file(
                    ConvertErrorKind::SheetPattern(e),
                    &options.pattern_in,
                )),
            }
        }
        return Ok((patterns, errors));
    }

    let paths = if options.batch {
        let list = read_text(&options.pattern_in)?;
        source::read_list(&list, options.range)
    } else {
        vec![options.pattern_in.clone()]
    };

    for path in paths {
        match read_file_pattern(table, options.input, &path) {
            Ok(pattern) => patterns.push(pattern),
            Err(e) => errors.push(e),
        }
    }
    Ok((patterns, errors))
}

fn read_file_pattern(
    table: &RegisterTable,
    format: PatternFormat,
    path: &Path,
) -> Result<Pattern, ConvertError> {
    let text = read_text(path)?;
    let name = source::pattern_name(path);
    let pattern = match format {
        PatternFormat::Ini => ini::decode(&text, &name)
            .map_err(|e| ConvertError::in_file(ConvertErrorKind::Ini(e), path))?,
        PatternFormat::Hex => hex::decode(&text, &name, table)
            .map_err(|e| ConvertError::in_file(ConvertErrorKind::Hex(e), path))?,
        PatternFormat::Sheet => {
            return Err(ConvertError::usage("sheet patterns are read column by column"));
        }
    };
    debug!("decoded pattern from {}: {pattern:#?}", path.display());
    Ok(pattern)
}

fn output_path(
    target: &OutputTarget,
    batch: bool,
    file_name: &str,
) -> Result<(PathBuf, bool), ConvertError> {
    let dir = match target {
        OutputTarget::File { path, overwrite } if !batch => return Ok((path.clone(), *overwrite)),
        OutputTarget::File { .. } => Path::new(DEFAULT_OUT_DIR),
        OutputTarget::Dir(dir) => dir.as_path(),
    };
    fs::create_dir_all(dir).map_err(|e| ConvertError::io(dir, e))?;
    Ok((dir.join(file_name), true))
}

fn check_overwrite(path: &Path, overwrite: bool) -> Result<(), ConvertError> {
    if !overwrite && path.exists() {
        return Err(ConvertError::usage(format!(
            "output file '{}' already exists (use -O to overwrite)",
            path.display()
        )));
    }
    Ok(())
}

fn write_output(path: &Path, overwrite: bool, contents: &str) -> Result<(), ConvertError> {
    check_overwrite(path, overwrite)?;
    fs::write(path, contents).map_err(|e| ConvertError::io(path, e))
}

/// Renders one pattern in a file format.
///
/// # Errors
///
/// Returns the value or address failure that stopped the encode.
pub fn render_pattern(
    table: &RegisterTable,
    pattern: &Pattern,
    format: PatternFormat,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<String, ConvertError> {
    match format {
        PatternFormat::Ini => Ok(ini::encode(table, pattern, diagnostics)?),
        PatternFormat::Hex => Ok(hex::encode(table, pattern, diagnostics)?),
        PatternFormat::Sheet => Err(ConvertError::usage(
            "sheet patterns are written into a reference sheet",
        )),
    }
}

/// Writes `patterns` as files, one per pattern.
fn write_files(
    table: &RegisterTable,
    patterns: &[Pattern],
    options: &ConvertOptions,
    report: &mut ConvertReport,
) {
    for pattern in patterns {
        let written = render_pattern(table, pattern, options.output, &mut report.diagnostics)
            .and_then(|text| {
                let file_name = format!("{}.{}", pattern.name, options.output.extension());
                let (path, overwrite) = output_path(&options.target, options.batch, &file_name)?;
                write_output(&path, overwrite, &text)?;
                Ok(path)
            });
        match written {
            Ok(path) => {
                info!("wrote pattern '{}' to {}", pattern.name, path.display());
                report.written.push(path);
            }
            Err(e) => report.errors.push(e),
        }
    }
}

/// Appends `patterns` as columns of the reference sheet and writes it.
fn write_sheet(
    table: &RegisterTable,
    table_source: &TableSource,
    patterns: &[Pattern],
    options: &ConvertOptions,
    report: &mut ConvertReport,
) -> Result<(), ConvertError> {
    let TableSource::Sheet { path: reference, fresh } = table_source else {
        return Err(ConvertError::usage(
            "sheet output needs a sheet table (-x or -X)",
        ));
    };
    let mut sheet = Sheet::load(reference)?;
    if *fresh {
        sheet_pattern::prepare_fresh(&mut sheet);
    }
    let mut layout = SheetLayout::scan(&sheet)
        .map_err(|e| ConvertError::in_file(ConvertErrorKind::SheetPattern(e), reference))?;

    for pattern in patterns {
        match sheet_pattern::append_pattern(
            &mut sheet,
            &mut layout,
            table,
            pattern,
            &mut report.diagnostics,
        ) {
            Ok(column) => debug!("pattern '{}' written to column {column}", pattern.name),
            Err(e) => report.errors.push(e.into()),
        }
    }

    let file_name = if is_workbook(reference) {
        WORKBOOK_OUT_NAME
    } else {
        SHEET_OUT_NAME
    };
    let (path, overwrite) = output_path(&options.target, false, file_name)?;
    check_overwrite(&path, overwrite)?;
    sheet.save(&path)?;
    info!("wrote {} pattern columns to {}", patterns.len(), path.display());
    report.written.push(path);
    Ok(())
}

/// Converts the patterns selected by `options` against an already loaded
/// table.
///
/// # Errors
///
/// Returns an error only for failures that stop the whole run: an
/// unreadable pattern source, an unusable reference sheet, or an output
/// that cannot be written. Per-pattern failures land in
/// [`ConvertReport::errors`].
pub fn convert(
    table: &RegisterTable,
    table_source: &TableSource,
    options: &ConvertOptions,
    colors: &ColorMap,
) -> Result<ConvertReport, ConvertError> {
    let (patterns, errors) = read_patterns(table, options, colors)?;
    let mut report = ConvertReport {
        errors,
        ..ConvertReport::default()
    };

    if options.output == PatternFormat::Sheet {
        write_sheet(table, table_source, &patterns, options, &mut report)?;
    } else {
        if options.batch && matches!(options.target, OutputTarget::File { .. }) {
            warn!("output file ignored in batch mode, writing to '{DEFAULT_OUT_DIR}'");
        }
        write_files(table, &patterns, options, &mut report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorClass;
    use crate::export::{to_sheet, SheetExportOptions};
    use regmap_core::PatternValue;
    use rstest::rstest;

    const TABLE: &str = "\
T: core
enable 0x0 0 0 u y 0
mode   0x0 3 1 u y 2
gain   0x4 7 0 s y -1
";

    fn table() -> RegisterTable {
        table_text::parse_table(TABLE).unwrap()
    }

    fn options(input: PatternFormat, output: PatternFormat, pattern_in: PathBuf) -> ConvertOptions {
        ConvertOptions {
            input,
            output,
            pattern_in,
            batch: false,
            range: RangeSpec::default(),
            target: OutputTarget::default(),
        }
    }

    #[rstest]
    #[case("ini", PatternFormat::Ini)]
    #[case("HEX", PatternFormat::Hex)]
    #[case("xlsx", PatternFormat::Sheet)]
    #[case("sheet", PatternFormat::Sheet)]
    fn parses_format_names(#[case] text: &str, #[case] expected: PatternFormat) {
        assert_eq!(text.parse::<PatternFormat>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!("csv".parse::<PatternFormat>().is_err());
    }

    #[test]
    fn load_table_locates_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.txt");
        fs::write(&path, "T: core\nenable 0x0 0 0 q y 0\n").unwrap();

        let err = load_table(&TableSource::Text(path), &ColorMap::default()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::TableSyntax);
        assert!(err.format_for_stderr().contains("table.txt:2"));
    }

    #[test]
    fn ini_to_hex_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pattern_in = dir.path().join("p1.ini");
        fs::write(&pattern_in, "enable = 1\nmode = 2\n").unwrap();
        let out = dir.path().join("out");
        let mut opts = options(PatternFormat::Ini, PatternFormat::Hex, pattern_in);
        opts.target = OutputTarget::Dir(out.clone());

        let report = convert(&table(), &TableSource::Text("t".into()), &opts, &ColorMap::default())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.written, vec![out.join("p1.pat")]);
        assert_eq!(
            fs::read_to_string(out.join("p1.pat")).unwrap(),
            "000000000005\n0004000000ff\n"
        );
        assert_eq!(report.diagnostics.len(), 1);
    }

    /// Writes a list file naming `names` by absolute path; empty names
    /// stay blank lines.
    fn write_list(dir: &Path, names: &[&str]) -> PathBuf {
        let lines: Vec<String> = names
            .iter()
            .map(|name| match *name {
                "" => String::new(),
                name => dir.join(name).display().to_string(),
            })
            .collect();
        let list = dir.join("list.txt");
        fs::write(&list, lines.join("\n")).unwrap();
        list
    }

    #[test]
    fn batch_continues_past_failed_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.ini"), "enable = 1\nmode = 1\ngain = 3\n").unwrap();
        fs::write(dir.path().join("bad.ini"), "enable = 5\nmode = 1\ngain = 3\n").unwrap();
        fs::write(dir.path().join("broken.ini"), "enable 1\n").unwrap();
        let list = write_list(dir.path(), &["bad.ini", "", "good.ini", "broken.ini"]);
        let out = dir.path().join("out");
        let mut opts = options(PatternFormat::Ini, PatternFormat::Ini, list);
        opts.batch = true;
        opts.target = OutputTarget::Dir(out.clone());

        let report = convert(&table(), &TableSource::Text("t".into()), &opts, &ColorMap::default())
            .unwrap();

        assert_eq!(report.written, vec![out.join("good.ini")]);
        assert_eq!(report.errors.len(), 2);
        let classes: Vec<ErrorClass> = report.errors.iter().map(ConvertError::class).collect();
        assert_eq!(classes, vec![ErrorClass::PatternSyntax, ErrorClass::RegisterValue]);
        assert!(!out.join("bad.ini").exists());
    }

    #[test]
    fn batch_range_selects_list_rows() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(dir.path().join(format!("{name}.ini")), "enable = 1\n").unwrap();
        }
        let list = write_list(dir.path(), &["a.ini", "b.ini", "c.ini"]);
        let mut opts = options(PatternFormat::Ini, PatternFormat::Hex, list);
        opts.batch = true;
        opts.range = RangeSpec::new(2, 0);

        let (patterns, errors) = read_patterns(&table(), &opts, &ColorMap::default()).unwrap();
        assert!(errors.is_empty());
        let names: Vec<&str> = patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn output_file_is_not_overwritten_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let pattern_in = dir.path().join("p1.ini");
        fs::write(&pattern_in, "enable = 1\n").unwrap();
        let existing = dir.path().join("out.pat");
        fs::write(&existing, "keep").unwrap();

        let mut opts = options(PatternFormat::Ini, PatternFormat::Hex, pattern_in);
        opts.target = OutputTarget::File {
            path: existing.clone(),
            overwrite: false,
        };
        let source = TableSource::Text("t".into());
        let report = convert(&table(), &source, &opts, &ColorMap::default()).unwrap();
        assert_eq!(report.errors.iter().next().map(ConvertError::class), Some(ErrorClass::Usage));
        assert_eq!(fs::read_to_string(&existing).unwrap(), "keep");

        opts.target = OutputTarget::File {
            path: existing.clone(),
            overwrite: true,
        };
        let report = convert(&table(), &source, &opts, &ColorMap::default()).unwrap();
        assert!(report.is_success());
        assert!(fs::read_to_string(&existing).unwrap().starts_with("0000"));
    }

    #[test]
    fn sheet_output_needs_sheet_table() {
        let dir = tempfile::tempdir().unwrap();
        let pattern_in = dir.path().join("p1.ini");
        fs::write(&pattern_in, "enable = 1\n").unwrap();
        let opts = options(PatternFormat::Ini, PatternFormat::Sheet, pattern_in);

        let err = convert(&table(), &TableSource::Text("t".into()), &opts, &ColorMap::default())
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Usage);
    }

    #[test]
    fn ini_to_sheet_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let colors = ColorMap::default();
        let table = table();
        let reference = dir.path().join("table.json");
        to_sheet(&table, SheetExportOptions::default(), &colors)
            .save(&reference)
            .unwrap();
        let pattern_in = dir.path().join("p1.ini");
        fs::write(&pattern_in, "enable = 1\nmode = 3\ngain = -2\n").unwrap();
        let out = dir.path().join("out");
        let source = TableSource::Sheet {
            path: reference,
            fresh: true,
        };
        let mut opts = options(PatternFormat::Ini, PatternFormat::Sheet, pattern_in);
        opts.target = OutputTarget::Dir(out.clone());

        let report = convert(&table, &source, &opts, &colors).unwrap();
        assert!(report.is_success());
        let sheet_out = out.join(SHEET_OUT_NAME);
        assert_eq!(report.written, vec![sheet_out.clone()]);

        let back = options(PatternFormat::Sheet, PatternFormat::Hex, sheet_out);
        let (patterns, errors) = read_patterns(&table, &back, &colors).unwrap();
        assert!(errors.is_empty());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].name, "p1");
        assert_eq!(patterns[0].get("MODE"), Some(&PatternValue::Text("0x3".to_string())));
        assert_eq!(patterns[0].get("GAIN"), Some(&PatternValue::Text("0xFE".to_string())));
    }
}
