//! CLI entry point for the progparser binary.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, LevelFilter};
use progparser::compare::{compare, render_report, CompareOptions};
use progparser::convert::{
    convert, load_table, ConvertOptions, OutputTarget, PatternFormat, TableSource,
};
use progparser::errors::{ConvertError, ConvertErrorKind, ErrorClass};
use progparser::export::{initial_ini, to_sheet, to_text, SheetExportOptions};
use progparser::sheet::{ColorMap, Sheet};
use progparser::source::RangeSpec;
use progparser::{cache, table_sheet};
use regmap_core as _;
use serde as _;
use serde_json as _;
use simple_logger::SimpleLogger;
use thiserror as _;
use umya_spreadsheet as _;
#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;

const USAGE_TEXT: &str = "\
Usage: progparser [-v|-q] <command> [options]

Commands:
  convert <in> <out> <pattern_in> <table_opt> [options]  Convert patterns (ini/hex/sheet)
  table <in_type> <out_type> <table> [options]           Convert a register table (txt/sheet/xlsx/db)
  diff <l_type> <r_type> <left> <right> [-s] [-a]        Compare two register tables
  mask-reserved <sheet>                                  Grey out reserved rows of a sheet table
  hide-reserved <sheet>                                  Hide reserved rows of a sheet table

Table options (convert, exactly one):
  -t <path>     Text table
  -x <path>     Sheet table (sheet output appends to a copy of it)
  -X <path>     Sheet table (sheet output replaces its pattern columns)
  -d <path>     Table cache

Convert options:
  -b            Batch mode: <pattern_in> is a list file, or several sheet columns
  -s <id>       First list row or sheet column
  -e <id>       Last list row or sheet column (0 = last)
  -o <path>     Output file, never overwritten
  -O <path>     Output file, overwritten if present
  --dir <dir>   Output directory (default: progp_out)
  -p <path>     Write the parsed table cache and stop

Table command options:
  -i                  Also create the initial all-defaults pattern
  --dir <dir>         Output directory (default: .)
  --no-reserved-gaps  Do not fill address gaps with reserved rows (sheet output)

Diff options:
  -s            Ignore the sign flag
  -a            Ignore the access flag

Global options:
  -v, --verbose  Debug logging
  -q, --quiet    Errors only
  -h, --help     Show this help message

Sheet files ending in .xlsx or .xlsm are Excel workbooks (first worksheet);
any other sheet file is a JSON grid.

Examples:
  progparser convert ini hex reg.ini -t table.txt
  progparser convert xlsx hex regs.xlsx -x table.xlsx -b -s 6
  progparser convert ini sheet reg.ini -x table.sheet.json
  progparser convert ini sheet list.txt -x table.sheet.json -b -s 1 -e 3
  progparser table txt sheet table.txt -i
  progparser diff txt sheet table.txt table.sheet.json -s
";

/// Text table written by `table`.
const TEXT_DUMP_NAME: &str = "table_dump.txt";
/// Sheet table written by `table`.
const SHEET_DUMP_NAME: &str = "table_dump.sheet.json";
/// Workbook table written by `table ... xlsx`.
const WORKBOOK_DUMP_NAME: &str = "table_dump.xlsx";
/// Table cache written by `table`.
const CACHE_DUMP_NAME: &str = "table_dump.json";
/// Initial pattern written by `table -i`.
const INITIAL_DUMP_NAME: &str = "reg_dump.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    const fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Error,
            Self::Normal => LevelFilter::Info,
            Self::Verbose => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Text,
    Sheet,
    Workbook,
    Cache,
}

impl TableKind {
    fn parse(text: &OsStr) -> Result<Self, String> {
        match text.to_string_lossy().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "sheet" => Ok(Self::Sheet),
            "xlsx" => Ok(Self::Workbook),
            "db" | "cache" => Ok(Self::Cache),
            other => Err(format!(
                "unknown table type '{other}' (expected txt, sheet, xlsx or db)"
            )),
        }
    }

    fn source(self, path: PathBuf) -> TableSource {
        match self {
            Self::Text => TableSource::Text(path),
            Self::Sheet | Self::Workbook => TableSource::Sheet { path, fresh: false },
            Self::Cache => TableSource::Cache(path),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Convert(ConvertArgs),
    Table(TableArgs),
    Diff(DiffArgs),
    MaskReserved(PathBuf),
    HideReserved(PathBuf),
}

#[derive(Debug, PartialEq, Eq)]
enum ConvertMode {
    ExportCache(PathBuf),
    Patterns(ConvertOptions),
}

#[derive(Debug, PartialEq, Eq)]
struct ConvertArgs {
    table: TableSource,
    mode: ConvertMode,
}

#[derive(Debug, PartialEq, Eq)]
struct TableArgs {
    input: TableSource,
    output: TableKind,
    initial: bool,
    dir: PathBuf,
    reserved_gaps: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct DiffArgs {
    left: TableSource,
    right: TableSource,
    options: CompareOptions,
}

#[derive(Debug, PartialEq, Eq)]
struct Cli {
    command: Command,
    verbosity: Verbosity,
}

#[derive(Debug)]
enum ParseResult {
    Command(Cli),
    Help,
}

fn parse_args(args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut verbosity = Verbosity::default();
    let mut rest = Vec::new();
    for arg in args {
        if arg == "-v" || arg == "--verbose" {
            verbosity = Verbosity::Verbose;
        } else if arg == "-q" || arg == "--quiet" {
            verbosity = Verbosity::Quiet;
        } else {
            rest.push(arg);
        }
    }
    let mut args = rest.into_iter();

    let first = args.next().ok_or_else(|| "missing command".to_string())?;
    if first == "--help" || first == "-h" || first == "help" {
        return Ok(ParseResult::Help);
    }

    let command = match first.to_string_lossy().as_ref() {
        "convert" => parse_convert_args(args).map(Command::Convert),
        "table" => parse_table_args(args).map(Command::Table),
        "diff" => parse_diff_args(args).map(Command::Diff),
        "mask-reserved" => parse_single_path(args).map(Command::MaskReserved),
        "hide-reserved" => parse_single_path(args).map(Command::HideReserved),
        other => Err(format!("unknown command: {other}")),
    }?;
    Ok(ParseResult::Command(Cli { command, verbosity }))
}

fn next_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<OsString, String> {
    args.next()
        .ok_or_else(|| format!("missing value for {flag}"))
}

fn next_number(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<u32, String> {
    let value = next_value(args, flag)?;
    let text = value.to_string_lossy();
    text.parse()
        .map_err(|_| format!("invalid value for {flag}: '{text}'"))
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str) -> Result<(), String> {
    if slot.is_some() {
        return Err(format!("multiple {what} provided"));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_format(text: &OsStr) -> Result<PatternFormat, String> {
    text.to_string_lossy().parse()
}

#[allow(clippy::while_let_on_iterator)]
fn parse_convert_args(mut args: impl Iterator<Item = OsString>) -> Result<ConvertArgs, String> {
    let mut positional = Vec::new();
    let mut table: Option<TableSource> = None;
    let mut cache_out: Option<PathBuf> = None;
    let mut output_file: Option<(PathBuf, bool)> = None;
    let mut dir: Option<PathBuf> = None;
    let mut batch = false;
    let mut range = RangeSpec::default();

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        let flag = arg.to_string_lossy().to_string();
        match flag.as_str() {
            "-t" => {
                let path = PathBuf::from(next_value(&mut args, "-t")?);
                set_once(&mut table, TableSource::Text(path), "tables")?;
            }
            "-x" | "-X" => {
                let path = PathBuf::from(next_value(&mut args, &flag)?);
                let source = TableSource::Sheet {
                    path,
                    fresh: flag == "-X",
                };
                set_once(&mut table, source, "tables")?;
            }
            "-d" => {
                let path = PathBuf::from(next_value(&mut args, "-d")?);
                set_once(&mut table, TableSource::Cache(path), "tables")?;
            }
            "-b" => batch = true,
            "-s" => range.start = next_number(&mut args, "-s")?,
            "-e" => range.end = next_number(&mut args, "-e")?,
            "-o" | "-O" => {
                let path = PathBuf::from(next_value(&mut args, &flag)?);
                set_once(&mut output_file, (path, flag == "-O"), "output files")?;
            }
            "--dir" => {
                let path = PathBuf::from(next_value(&mut args, "--dir")?);
                set_once(&mut dir, path, "output directories")?;
            }
            "-p" => {
                let path = PathBuf::from(next_value(&mut args, "-p")?);
                set_once(&mut cache_out, path, "cache outputs")?;
            }
            _ if flag.starts_with('-') => return Err(format!("unknown option: {flag}")),
            _ => positional.push(arg),
        }
    }

    let table =
        table.ok_or_else(|| "missing register table (use -t, -x, -X or -d)".to_string())?;
    if let Some(path) = cache_out {
        return Ok(ConvertArgs {
            table,
            mode: ConvertMode::ExportCache(path),
        });
    }

    let [input, output, pattern_in]: [OsString; 3] = positional
        .try_into()
        .map_err(|_| "expected <in> <out> <pattern_in>".to_string())?;
    let target = match (output_file, dir) {
        (Some(_), Some(_)) => return Err("-o/-O and --dir cannot be combined".to_string()),
        (Some((path, overwrite)), None) => OutputTarget::File { path, overwrite },
        (None, Some(dir)) => OutputTarget::Dir(dir),
        (None, None) => OutputTarget::default(),
    };

    Ok(ConvertArgs {
        table,
        mode: ConvertMode::Patterns(ConvertOptions {
            input: parse_format(&input)?,
            output: parse_format(&output)?,
            pattern_in: PathBuf::from(pattern_in),
            batch,
            range,
            target,
        }),
    })
}

#[allow(clippy::while_let_on_iterator)]
fn parse_table_args(mut args: impl Iterator<Item = OsString>) -> Result<TableArgs, String> {
    let mut positional = Vec::new();
    let mut initial = false;
    let mut reserved_gaps = true;
    let mut dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        if arg == "-i" {
            initial = true;
        } else if arg == "--no-reserved-gaps" {
            reserved_gaps = false;
        } else if arg == "--dir" {
            let path = PathBuf::from(next_value(&mut args, "--dir")?);
            set_once(&mut dir, path, "output directories")?;
        } else if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        } else {
            positional.push(arg);
        }
    }

    let [input, output, table]: [OsString; 3] = positional
        .try_into()
        .map_err(|_| "expected <in_type> <out_type> <table>".to_string())?;
    Ok(TableArgs {
        input: TableKind::parse(&input)?.source(PathBuf::from(table)),
        output: TableKind::parse(&output)?,
        initial,
        dir: dir.unwrap_or_else(|| PathBuf::from(".")),
        reserved_gaps,
    })
}

fn parse_diff_args(args: impl Iterator<Item = OsString>) -> Result<DiffArgs, String> {
    let mut positional = Vec::new();
    let mut options = CompareOptions::default();

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        if arg == "-s" {
            options.ignore_sign = true;
        } else if arg == "-a" {
            options.ignore_access = true;
        } else if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        } else {
            positional.push(arg);
        }
    }

    let [l_type, r_type, left, right]: [OsString; 4] = positional
        .try_into()
        .map_err(|_| "expected <l_type> <r_type> <left> <right>".to_string())?;
    Ok(DiffArgs {
        left: TableKind::parse(&l_type)?.source(PathBuf::from(left)),
        right: TableKind::parse(&r_type)?.source(PathBuf::from(right)),
        options,
    })
}

fn parse_single_path(args: impl Iterator<Item = OsString>) -> Result<PathBuf, String> {
    let mut input: Option<PathBuf> = None;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }
        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }
        set_once(&mut input, PathBuf::from(arg), "input paths")?;
    }

    input.ok_or_else(|| "missing input path".to_string())
}

fn report(error: &ConvertError) -> i32 {
    eprint!("{}", error.format_block());
    1
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConvertError> {
    fs::write(path, contents).map_err(|e| ConvertError::io(path, e))
}

fn run_convert(args: ConvertArgs, colors: &ColorMap) -> Result<(), ConvertError> {
    let table = load_table(&args.table, colors)?;
    let options = match args.mode {
        ConvertMode::ExportCache(path) => {
            cache::save(&table, &path)?;
            println!("Table cache written to {}", path.display());
            return Ok(());
        }
        ConvertMode::Patterns(options) => options,
    };

    let report = convert(&table, &args.table, &options, colors)?;
    for path in &report.written {
        println!("{}", path.display());
    }
    if report.is_success() {
        return Ok(());
    }

    eprint!("{}", report.errors.format_blocks());
    Err(ConvertError::usage(format!(
        "{} pattern(s) failed to convert",
        report.errors.len()
    )))
}

fn run_table(args: &TableArgs, colors: &ColorMap) -> Result<(), ConvertError> {
    let table = load_table(&args.input, colors)?;
    fs::create_dir_all(&args.dir).map_err(|e| ConvertError::io(&args.dir, e))?;

    let path = match args.output {
        TableKind::Text => {
            let path = args.dir.join(TEXT_DUMP_NAME);
            write_file(&path, &to_text(&table))?;
            if args.initial {
                let ini_path = args.dir.join(INITIAL_DUMP_NAME);
                write_file(&ini_path, &initial_ini(&table)?)?;
                println!("{}", ini_path.display());
            }
            path
        }
        TableKind::Sheet | TableKind::Workbook => {
            let options = SheetExportOptions {
                initial_pattern: args.initial,
                reserved_gaps: args.reserved_gaps,
            };
            let name = if args.output == TableKind::Workbook {
                WORKBOOK_DUMP_NAME
            } else {
                SHEET_DUMP_NAME
            };
            let path = args.dir.join(name);
            to_sheet(&table, options, colors).save(&path)?;
            path
        }
        TableKind::Cache => {
            let path = args.dir.join(CACHE_DUMP_NAME);
            cache::save(&table, &path)?;
            path
        }
    };
    println!("{}", path.display());
    Ok(())
}

/// Returns whether the tables differ.
fn run_diff(args: &DiffArgs, colors: &ColorMap) -> Result<bool, ConvertError> {
    let left = load_table(&args.left, colors)?;
    let right = load_table(&args.right, colors)?;
    let diffs = compare(&left, &right, args.options);
    if diffs.is_empty() {
        info!("tables are identical");
        return Ok(false);
    }
    print!("{}", render_report(&diffs));
    Ok(true)
}

fn run_reserved(path: &Path, hide: bool, colors: &ColorMap) -> Result<(), ConvertError> {
    let mut sheet = Sheet::load(path)?;
    let changed = if hide {
        table_sheet::hide_reserved(&mut sheet)
    } else {
        table_sheet::mask_reserved(&mut sheet, colors)
    }
    .map_err(|e| ConvertError::in_file(ConvertErrorKind::TableSheet(e), path))?;
    sheet.save(path)?;
    let action = if hide { "hidden" } else { "masked" };
    println!("{changed} reserved row(s) {action} in {}", path.display());
    Ok(())
}

fn run(command: Command) -> i32 {
    let colors = ColorMap::default();
    let result = match command {
        Command::Convert(args) => run_convert(args, &colors),
        Command::Table(args) => run_table(&args, &colors),
        Command::Diff(args) => match run_diff(&args, &colors) {
            Ok(true) => return 1,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        },
        Command::MaskReserved(path) => run_reserved(&path, false, &colors),
        Command::HideReserved(path) => run_reserved(&path, true, &colors),
    };
    match result {
        Ok(()) => 0,
        Err(e) if e.class() == ErrorClass::Usage => {
            eprintln!("{}", e.format_for_stderr());
            1
        }
        Err(e) => report(&e),
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(cli)) => {
            if let Err(e) = SimpleLogger::new()
                .with_level(cli.verbosity.level())
                .without_timestamps()
                .init()
            {
                eprintln!("warning: logger unavailable: {e}");
            }
            run(cli.command)
        }
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
