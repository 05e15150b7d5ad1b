//! INI pattern codec.
//!
//! Encoding walks the display groups of the table, so the layout of the
//! output is driven by the schema and not by the pattern. Decoding keeps
//! values as raw text; they are validated when the pattern is encoded.

use std::fmt::Write as _;

use log::debug;
use regmap_core::{
    numeric, resolve_field, Diagnostic, DisplayEntry, Field, FieldKind, FieldValue, Pattern,
    PatternValue, RegisterTable, ScalarKind, ValueError,
};

/// Expected shape of a pattern line.
pub const LINE_GRAMMAR: &str = "<name> = <value> [# comment]";

/// What went wrong on a pattern line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IniErrorKind {
    /// No `=` separator.
    #[error("missing '='")]
    MissingEquals,
    /// Nothing, or more than one token, before `=`.
    #[error("invalid name '{0}'")]
    Name(String),
    /// Nothing after `=`.
    #[error("missing value")]
    MissingValue,
}

/// A malformed pattern line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct IniError {
    /// 1-indexed line number.
    pub line: usize,
    /// Failure detail.
    pub kind: IniErrorKind,
}

/// Renders `pattern` as INI text.
///
/// Inaccessible fields are left out. Fields missing from the pattern fall
/// back to their default and add a [`Diagnostic`].
///
/// # Errors
///
/// Returns the first [`ValueError`]; nothing is rendered in that case.
pub fn encode(
    table: &RegisterTable,
    pattern: &Pattern,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<String, ValueError> {
    let mut out = String::new();
    let mut first_tag = true;

    for group in table.groups() {
        if let Some(tag) = &group.tag {
            if !first_tag {
                out.push('\n');
            }
            first_tag = false;
            let _ = writeln!(out, "[{tag}]");
        }

        for entry in &group.entries {
            match *entry {
                DisplayEntry::Break => out.push('\n'),
                DisplayEntry::Field { id, .. } => {
                    let field = table.field(id);
                    if !field.is_access {
                        continue;
                    }
                    let value = resolve_field(field, pattern, diagnostics)?;
                    out.push_str(&render_line(table, field, &value, group.max_name_len));
                    out.push('\n');
                }
            }
        }
    }
    Ok(out)
}

fn render_line(
    table: &RegisterTable,
    field: &Field,
    value: &FieldValue,
    max_len: usize,
) -> String {
    let (text, pad) = match (&field.kind, value) {
        (FieldKind::Bits(bits), FieldValue::Bits(v)) if table.is_hex_output(field) => {
            let text = numeric::format(*v, bits.width(), bits.is_signed, true);
            let pad = if text.len() > 6 { 16 } else { 12 };
            (text, pad)
        }
        (FieldKind::Bits(bits), FieldValue::Bits(v)) => {
            (numeric::format(*v, bits.width(), bits.is_signed, false), 11)
        }
        (FieldKind::Scalar(ScalarKind::Str { quote, .. }), FieldValue::Str(s)) => {
            (quote.wrap(s), 11)
        }
        (_, FieldValue::Float(v)) => (format!("{v:?}"), 11),
        (_, FieldValue::Str(s)) => (s.clone(), 11),
        (_, FieldValue::Int(v) | FieldValue::Bits(v)) => (v.to_string(), 11),
    };

    let line = format!("{} = {text}", field.display_name());
    match &field.comment {
        Some(comment) => format!("{line:<width$} # {comment}", width = max_len + pad),
        None => line,
    }
}

/// Parses INI text into a pattern named `name`.
///
/// `[section]` headers, `#` comments and blank lines are skipped. Values keep
/// their text, quotes included, up to an unquoted `#`.
///
/// # Errors
///
/// Returns the first malformed line.
pub fn decode(text: &str, name: &str) -> Result<Pattern, IniError> {
    let mut pattern = Pattern::new(name);

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('[') || line.starts_with('#') {
            continue;
        }
        let fail = |kind| IniError {
            line: idx + 1,
            kind,
        };

        let (key, rest) = line
            .split_once('=')
            .ok_or_else(|| fail(IniErrorKind::MissingEquals))?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(fail(IniErrorKind::Name(key.to_string())));
        }
        let value = strip_comment(rest).trim();
        let value = if value.starts_with(['"', '\'']) {
            value
        } else {
            value.split_whitespace().next().unwrap_or_default()
        };
        if value.is_empty() {
            return Err(fail(IniErrorKind::MissingValue));
        }
        pattern.set(key, PatternValue::Text(value.to_string()));
    }

    debug!("decoded ini pattern: {pattern:#?}");
    Ok(pattern)
}

/// Text before the first `#` that is not inside quotes.
pub(crate) fn strip_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    for (idx, c) in text.char_indices() {
        match (quote, c) {
            (None, '#') => return &text[..idx],
            (None, '"' | '\'') => quote = Some(c),
            (Some(open), _) if open == c => quote = None,
            _ => {}
        }
    }
    text
}
