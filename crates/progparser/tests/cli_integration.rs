//! Integration tests for the progparser CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log as _;
use progparser::sheet::Sheet;
use proptest as _;
use regmap_core as _;
use rstest::rstest;
use serde as _;
use serde_json as _;
use simple_logger as _;
use thiserror as _;
use umya_spreadsheet as _;

const TABLE: &str = "\
T: core
enable 0x0 0 0 u y 0
mode   0x0 3 1 u y 2
";

fn create_temp_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_progparser"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run progparser")
}

#[test]
fn convert_ini_to_hex() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    create_temp_file(temp_dir.path(), "reg.ini", "[core]\nenable = 1\n");

    let output = run(temp_dir.path(), &["convert", "ini", "hex", "reg.ini", "-t", "table.txt"]);

    assert!(output.status.success());
    let hex = fs::read_to_string(temp_dir.path().join("progp_out/reg.pat")).unwrap();
    assert_eq!(hex, "000000000005\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'mode' is not found in pattern 'reg'"));
}

#[test]
fn convert_hex_to_ini_with_output_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    create_temp_file(temp_dir.path(), "reg.pat", "000000000007\n");

    let output = run(
        temp_dir.path(),
        &["convert", "hex", "ini", "reg.pat", "-t", "table.txt", "-o", "out.ini"],
    );

    assert!(output.status.success());
    let ini = fs::read_to_string(temp_dir.path().join("out.ini")).unwrap();
    assert_eq!(ini, "[core]\nenable = 1\nmode = 3\n");
}

#[test]
fn convert_refuses_to_overwrite_without_force() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    create_temp_file(temp_dir.path(), "reg.ini", "enable = 1\nmode = 0\n");
    create_temp_file(temp_dir.path(), "out.pat", "keep\n");

    let output = run(
        temp_dir.path(),
        &["convert", "ini", "hex", "reg.ini", "-t", "table.txt", "-o", "out.pat"],
    );
    assert!(!output.status.success());
    assert_eq!(fs::read_to_string(temp_dir.path().join("out.pat")).unwrap(), "keep\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already exists (use -O to overwrite)"));
    assert!(stderr.contains("error: 1 pattern(s) failed to convert"));

    let output = run(
        temp_dir.path(),
        &["convert", "ini", "hex", "reg.ini", "-t", "table.txt", "-O", "out.pat"],
    );
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("out.pat")).unwrap(),
        "000000000001\n"
    );
}

#[test]
fn table_syntax_error_prints_block() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", "T: core\nenable 0x0 0 0 u maybe 0\n");
    create_temp_file(temp_dir.path(), "reg.ini", "enable = 1\n");

    let output = run(temp_dir.path(), &["convert", "ini", "hex", "reg.ini", "-t", "table.txt"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TableSyntaxError: (table.txt:2)"));
    assert!(stderr.contains("syntax of register descriptor:"));
    assert!(!temp_dir.path().join("progp_out").exists());
}

#[test]
fn batch_reports_failures_and_keeps_going() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    let inputs = temp_dir.path().join("in");
    fs::create_dir(&inputs).unwrap();
    create_temp_file(&inputs, "a.ini", "enable = 1\nmode = 7\n");
    create_temp_file(&inputs, "b.ini", "enable = 1\nmode = 8\n");
    create_temp_file(&inputs, "c.ini", "enable = 0\nmode = 1\n");
    create_temp_file(&inputs, "list.txt", "in/a.ini\nin/b.ini\nin/c.ini\n");

    let output = run(
        temp_dir.path(),
        &["convert", "ini", "hex", "in/list.txt", "-t", "table.txt", "-b"],
    );

    assert_eq!(output.status.code(), Some(1));
    let out_dir = temp_dir.path().join("progp_out");
    assert_eq!(fs::read_to_string(out_dir.join("a.pat")).unwrap(), "00000000000f\n");
    assert!(!out_dir.join("b.pat").exists());
    assert_eq!(fs::read_to_string(out_dir.join("c.pat")).unwrap(), "000000000002\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("RegisterValueError:"));
    assert!(stderr.contains("pattern:  b"));
    assert!(stderr.contains("register: MODE"));
}

#[test]
fn sheet_round_trip_through_cli() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    create_temp_file(temp_dir.path(), "reg.ini", "enable = 1\nmode = 5\n");

    let output = run(temp_dir.path(), &["table", "txt", "sheet", "table.txt", "-i"]);
    assert!(output.status.success());
    let sheet_table = temp_dir.path().join("table_dump.sheet.json");
    assert!(sheet_table.exists());

    let output = run(
        temp_dir.path(),
        &["convert", "ini", "sheet", "reg.ini", "-x", "table_dump.sheet.json"],
    );
    assert!(output.status.success());
    let sheet_out = temp_dir.path().join("progp_out/register.sheet.json");
    let sheet = Sheet::load(&sheet_out).unwrap();
    assert_eq!(sheet.text(2, 6), Some("PAT-1"));
    assert_eq!(sheet.text(2, 7), Some("reg"));

    let output = run(
        temp_dir.path(),
        &[
            "convert",
            "sheet",
            "hex",
            "progp_out/register.sheet.json",
            "-x",
            "table_dump.sheet.json",
            "-s",
            "7",
            "--dir",
            "back",
        ],
    );
    assert!(output.status.success());
    let hex = fs::read_to_string(temp_dir.path().join("back/reg.pat")).unwrap();
    assert_eq!(hex, "00000000000b\n");
}

#[test]
fn workbook_round_trip_through_cli() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    create_temp_file(temp_dir.path(), "reg.ini", "enable = 0\nmode = 6\n");

    let output = run(temp_dir.path(), &["table", "txt", "xlsx", "table.txt", "-i"]);
    assert!(output.status.success());
    assert!(temp_dir.path().join("table_dump.xlsx").exists());

    let output = run(
        temp_dir.path(),
        &["convert", "ini", "xlsx", "reg.ini", "-x", "table_dump.xlsx"],
    );
    assert!(output.status.success());
    let workbook = temp_dir.path().join("progp_out/register.xlsx");
    let sheet = Sheet::load(&workbook).unwrap();
    assert_eq!(sheet.text(2, 7), Some("reg"));

    let output = run(
        temp_dir.path(),
        &[
            "convert",
            "xlsx",
            "hex",
            "progp_out/register.xlsx",
            "-x",
            "table_dump.xlsx",
            "-s",
            "7",
            "--dir",
            "back",
        ],
    );
    assert!(output.status.success());
    let hex = fs::read_to_string(temp_dir.path().join("back/reg.pat")).unwrap();
    assert_eq!(hex, "00000000000c\n");
}

#[test]
fn diff_exits_non_zero_on_differences() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "left.txt", TABLE);
    create_temp_file(temp_dir.path(), "right.txt", "enable 0x0 0 0 s y 0\nmode 0x0 3 1 u y 2\n");

    let output = run(temp_dir.path(), &["diff", "txt", "txt", "left.txt", "right.txt"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<! enable"));
    assert!(stdout.contains(">! enable"));

    let output = run(temp_dir.path(), &["diff", "txt", "txt", "left.txt", "right.txt", "-s"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn cache_export_and_reuse() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", TABLE);
    create_temp_file(temp_dir.path(), "reg.ini", "enable = 1\nmode = 1\n");

    let output = run(temp_dir.path(), &["convert", "-t", "table.txt", "-p", "table.db"]);
    assert!(output.status.success());
    assert!(temp_dir.path().join("table.db").exists());

    let output = run(temp_dir.path(), &["convert", "ini", "hex", "reg.ini", "-d", "table.db"]);
    assert!(output.status.success());
    let hex = fs::read_to_string(temp_dir.path().join("progp_out/reg.pat")).unwrap();
    assert_eq!(hex, "000000000003\n");
}

#[test]
fn mask_and_hide_reserved_rows() {
    let temp_dir = tempfile::tempdir().unwrap();
    create_temp_file(temp_dir.path(), "table.txt", "enable 0x0 0 0 u y 0\ngain 0x8 7 0 s y -1\n");
    let output = run(temp_dir.path(), &["table", "txt", "sheet", "table.txt"]);
    assert!(output.status.success());

    let output = run(temp_dir.path(), &["mask-reserved", "table_dump.sheet.json"]);
    assert!(output.status.success());
    let output = run(temp_dir.path(), &["hide-reserved", "table_dump.sheet.json"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 reserved row(s) hidden"));
}

#[rstest]
#[case(&["bogus"], "unknown command")]
#[case(&["convert", "ini", "hex", "reg.ini"], "missing register table")]
#[case(&["table", "txt", "pdf", "t.txt"], "unknown table type")]
fn usage_errors(#[case] args: &[&str], #[case] message: &str) {
    let temp_dir = tempfile::tempdir().unwrap();
    let output = run(temp_dir.path(), args);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains(message));
}

#[test]
fn help_prints_usage() {
    let temp_dir = tempfile::tempdir().unwrap();
    let output = run(temp_dir.path(), &["--help"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Usage: progparser"));
}
