//! Text schema parser.
//!
//! Line grammar, whitespace separated:
//!
//! ```text
//! # comment
//! T: <tag>
//! A: <addr> [title]
//! H: <name> [<name> ...]
//! I: <addr>
//! <br>
//! <name> <addr> <msb> <lsb> <s|u> <y|n> <init_val> [comment]
//! <name> str <quote> <init_val>
//! <name> float <init_val> [comment]
//! <name> int <init_val> [comment]
//! ```
//!
//! Parsing stops at the first malformed line.

use std::fmt;

use log::debug;
use regmap_core::field::strip_quotes;
use regmap_core::{
    numeric, BitField, BitRange, Field, ModelError, NumericError, QuoteStyle, RegisterTable,
    ScalarKind,
};

use crate::ini::strip_comment;

/// Line kinds of the text grammar, used to report the expected syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// `T:` line.
    Group,
    /// `A:` line.
    Address,
    /// `I:` line.
    Insert,
    /// Bit field line.
    Register,
    /// `str` scalar line.
    Str,
    /// `float` scalar line.
    Float,
    /// `int` scalar line.
    Int,
}

impl Descriptor {
    /// Grammar of this line kind.
    #[must_use]
    pub const fn grammar(self) -> &'static str {
        match self {
            Self::Group => "T: <tag_name>",
            Self::Address => "A: <addr> [title]",
            Self::Insert => "I: <addr>",
            Self::Register => {
                "<name> <addr> <msb> <lsb> <sign_type> <is_access> <init_val> [comment]"
            }
            Self::Str => "<name> str <quote_type> <init_val>",
            Self::Float => "<name> float <init_val> [comment]",
            Self::Int => "<name> int <init_val> [comment]",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Address => "address",
            Self::Insert => "insert",
            Self::Register => "register",
            Self::Str => "string",
            Self::Float => "float",
            Self::Int => "int",
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What went wrong on a schema line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableTextErrorKind {
    /// Too few tokens.
    #[error("missing {0}")]
    Missing(&'static str),
    /// A numeric token failed to parse.
    #[error("{what}: {source}")]
    Numeric {
        /// Which token.
        what: &'static str,
        /// Codec failure.
        source: NumericError,
    },
    /// Sign flag other than `s`/`u`.
    #[error("sign type flag must be 's' or 'u', found '{0}'")]
    SignFlag(String),
    /// Access flag other than `y`/`n`.
    #[error("access flag must be 'y' or 'n', found '{0}'")]
    AccessFlag(String),
    /// A scalar default that does not parse.
    #[error("invalid default '{0}'")]
    Scalar(String),
    /// Model invariant violated.
    #[error(transparent)]
    Model(ModelError),
}

/// A schema line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTextError {
    /// 1-indexed line number.
    pub line: usize,
    /// Line kind being parsed.
    pub descriptor: Descriptor,
    /// Failure detail.
    pub kind: TableTextErrorKind,
}

impl fmt::Display for TableTextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} descriptor: {}", self.descriptor, self.kind)
    }
}

impl std::error::Error for TableTextError {}

type LineResult = Result<(), (Descriptor, TableTextErrorKind)>;

/// Parses a text schema.
///
/// # Errors
///
/// Returns the first malformed line.
pub fn parse_table(source: &str) -> Result<RegisterTable, TableTextError> {
    let mut table = RegisterTable::new();

    for (idx, line) in source.lines().enumerate() {
        parse_line(&mut table, line).map_err(|(descriptor, kind)| TableTextError {
            line: idx + 1,
            descriptor,
            kind,
        })?;
    }

    debug!("parsed text table: {table:#?}");
    Ok(table)
}

fn parse_line(table: &mut RegisterTable, line: &str) -> LineResult {
    let toks: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = toks.first() else {
        return Ok(());
    };

    match first {
        _ if first.starts_with('#') => Ok(()),
        "T:" => {
            let tag = trailing_text(&toks[1..]);
            table.open_group(tag);
            Ok(())
        }
        "A:" => {
            let addr = address_token(&toks, Descriptor::Address)?;
            table.declare_slot(addr, trailing_text(&toks[2..]));
            Ok(())
        }
        "I:" => {
            let addr = address_token(&toks, Descriptor::Insert)?;
            table
                .insert_slot_reference(addr)
                .map_err(|e| (Descriptor::Insert, TableTextErrorKind::Model(e)))
        }
        "H:" => {
            toks[1..]
                .iter()
                .take_while(|tok| !tok.starts_with('#'))
                .for_each(|name| table.add_hex_output(name));
            Ok(())
        }
        "<br>" => {
            table.add_break();
            Ok(())
        }
        _ => parse_field(table, &toks),
    }
}

/// Text after the directive, cut at the first unquoted `#`, with
/// surrounding quotes removed.
fn trailing_text(toks: &[&str]) -> Option<String> {
    let joined = toks.join(" ");
    let text = strip_comment(&joined);
    let text = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn comment(toks: &[&str]) -> Option<String> {
    match toks.first() {
        None => None,
        Some(tok) if tok.starts_with('#') => None,
        Some(_) => trailing_text(toks),
    }
}

fn address_token(
    toks: &[&str],
    descriptor: Descriptor,
) -> Result<u32, (Descriptor, TableTextErrorKind)> {
    let token = toks
        .get(1)
        .ok_or((descriptor, TableTextErrorKind::Missing("address")))?;
    numeric::parse_u32(token).map_err(|source| {
        (
            descriptor,
            TableTextErrorKind::Numeric {
                what: "address",
                source,
            },
        )
    })
}

fn parse_field(table: &mut RegisterTable, toks: &[&str]) -> LineResult {
    let name = toks[0];
    let (descriptor, field) = match toks.get(1).copied() {
        Some("str") => (Descriptor::Str, parse_str(name, toks)),
        Some("float") => (Descriptor::Float, parse_float(name, toks)),
        Some("int") => (Descriptor::Int, parse_int(name, toks)),
        _ => (Descriptor::Register, parse_register(name, toks)),
    };
    let field = field.map_err(|kind| (descriptor, kind))?;
    table
        .add_field(field)
        .map(|_| ())
        .map_err(|e| (descriptor, TableTextErrorKind::Model(e)))
}

fn parse_str(name: &str, toks: &[&str]) -> Result<Field, TableTextErrorKind> {
    let quote = toks
        .get(2)
        .ok_or(TableTextErrorKind::Missing("quote type"))?;
    let rest = &toks[3..];
    match rest.first() {
        None => return Err(TableTextErrorKind::Missing("init_val")),
        Some(tok) if tok.starts_with('#') => return Err(TableTextErrorKind::Missing("init_val")),
        Some(_) => {}
    }
    let joined = rest.join(" ");
    let init = strip_quotes(strip_comment(&joined)).to_string();
    Ok(Field::scalar(
        name,
        ScalarKind::Str {
            quote: QuoteStyle::from_token(quote),
            init,
        },
        None,
    ))
}

fn parse_float(name: &str, toks: &[&str]) -> Result<Field, TableTextErrorKind> {
    let token = toks.get(2).ok_or(TableTextErrorKind::Missing("init_val"))?;
    let init = token
        .parse::<f64>()
        .map_err(|_| TableTextErrorKind::Scalar((*token).to_string()))?;
    Ok(Field::scalar(name, ScalarKind::Float(init), comment(&toks[3..])))
}

fn parse_int(name: &str, toks: &[&str]) -> Result<Field, TableTextErrorKind> {
    let token = toks.get(2).ok_or(TableTextErrorKind::Missing("init_val"))?;
    let init = token
        .parse::<i64>()
        .map_err(|_| TableTextErrorKind::Scalar((*token).to_string()))?;
    Ok(Field::scalar(name, ScalarKind::Int(init), comment(&toks[3..])))
}

fn parse_register(name: &str, toks: &[&str]) -> Result<Field, TableTextErrorKind> {
    if toks.len() < 7 {
        return Err(TableTextErrorKind::Missing(
            ["addr", "msb", "lsb", "sign_type", "is_access", "init_val"][toks.len() - 1],
        ));
    }

    let number = |what: &'static str, token: &str| {
        numeric::parse_u32(token).map_err(|source| TableTextErrorKind::Numeric { what, source })
    };
    let addr = number("addr", toks[1])?;
    let msb = number("msb", toks[2])?;
    let lsb = number("lsb", toks[3])?;
    let is_signed = match toks[4].to_ascii_lowercase().as_str() {
        "s" => true,
        "u" => false,
        _ => return Err(TableTextErrorKind::SignFlag(toks[4].to_string())),
    };
    let is_access = match toks[5].to_ascii_lowercase().as_str() {
        "y" => true,
        "n" => false,
        _ => return Err(TableTextErrorKind::AccessFlag(toks[5].to_string())),
    };

    let range = BitRange::new(msb, lsb)
        .ok_or(TableTextErrorKind::Model(ModelError::InvalidBitRange { msb, lsb }))?;
    let init_val = numeric::parse(toks[6], is_signed, range.width()).map_err(|source| {
        TableTextErrorKind::Numeric {
            what: "init_val",
            source,
        }
    })?;
    let bits = BitField::new(addr, range, is_signed, init_val).map_err(|source| {
        TableTextErrorKind::Numeric {
            what: "init_val",
            source,
        }
    })?;

    Ok(Field::bits(name, bits, is_access, comment(&toks[7..])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmap_core::{DisplayEntry, FieldKind};
    use rstest::rstest;

    const SCHEMA: &str = "\
# sample
T: core  # main block
A: 0x0 \"control\"
enable 0x0 0 0 u y 0   # enable bit
mode   0x0 3 1 u y 2   \"operating mode\"
<br>
gain   0x8 7 0 s n -3
H: gain mode # trailing
T: misc
label  str d \"hello world\"  # ignored
ratio  float 1.5 scale
count  int -4
";

    #[test]
    fn parses_full_schema() {
        let table = parse_table(SCHEMA).unwrap();

        assert_eq!(table.slots().len(), 2);
        assert_eq!(table.slot(0).unwrap().title.as_deref(), Some("control"));
        assert_eq!(table.groups().len(), 2);
        assert_eq!(table.groups()[0].tag.as_deref(), Some("core"));
        assert_eq!(table.groups()[0].max_name_len, 6);
        assert!(table.groups()[0].entries.contains(&DisplayEntry::Break));

        let mode = table.fields().find(|f| f.name == "MODE").unwrap();
        assert_eq!(mode.comment.as_deref(), Some("operating mode"));
        let gain = table.fields().find(|f| f.name == "GAIN").unwrap();
        assert!(!gain.is_access);
        assert_eq!(gain.as_bits().unwrap().init_val, -3);
        assert!(table.is_hex_output(gain));
        assert!(table.is_hex_output(mode));

        let label = table.fields().find(|f| f.name == "LABEL").unwrap();
        assert!(matches!(
            &label.kind,
            FieldKind::Scalar(ScalarKind::Str { quote: QuoteStyle::Double, init }) if init == "hello world"
        ));
        let ratio = table.fields().find(|f| f.name == "RATIO").unwrap();
        assert_eq!(ratio.comment.as_deref(), Some("scale"));
    }

    #[test]
    fn first_field_without_tag_opens_untagged_group() {
        let table = parse_table("a 0x0 0 0 u y 0\n").unwrap();
        assert_eq!(table.groups().len(), 1);
        assert_eq!(table.groups()[0].tag, None);
    }

    #[test]
    fn insert_directive_references_existing_slot() {
        let table = parse_table("a 0x4 0 0 u y 0\nb 0x4 1 1 u y 0\nT: alias\nI: 0x4\n").unwrap();
        let entries = &table.groups()[1].entries;
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| matches!(e, DisplayEntry::Field { inserted: true, .. })));
    }

    #[rstest]
    #[case("a 0x0 0 0 x y 0", 1, Descriptor::Register)]
    #[case("a 0x0 0 0 u q 0", 1, Descriptor::Register)]
    #[case("a 0x0 0 0 u y", 1, Descriptor::Register)]
    #[case("a 0x0 7 0 u y 0x100", 1, Descriptor::Register)]
    #[case("a 0x0 0 3 u y 0", 1, Descriptor::Register)]
    #[case("# ok\nr float abc", 2, Descriptor::Float)]
    #[case("r int 0x10", 1, Descriptor::Int)]
    #[case("s str d # only comment", 1, Descriptor::Str)]
    #[case("I: 0x20", 1, Descriptor::Insert)]
    #[case("A: zz", 1, Descriptor::Address)]
    fn malformed_lines_report_location(
        #[case] source: &str,
        #[case] line: usize,
        #[case] descriptor: Descriptor,
    ) {
        let err = parse_table(source).unwrap_err();
        assert_eq!(err.line, line);
        assert_eq!(err.descriptor, descriptor);
    }

    #[rstest]
    #[case("mode 0x0 3 1 u y 2 \"see #3 below\"", Some("see #3 below"))]
    #[case("mode 0x0 3 1 u y 2 \"see #3\" # note", Some("see #3"))]
    #[case("mode 0x0 3 1 u y 2 plain # note", Some("plain"))]
    #[case("mode 0x0 3 1 u y 2 # note", None)]
    fn comment_stops_at_unquoted_hash(#[case] source: &str, #[case] expected: Option<&str>) {
        let table = parse_table(source).unwrap();
        let field = table.fields().next().unwrap();
        assert_eq!(field.comment.as_deref(), expected);
    }

    #[test]
    fn quoted_hash_survives_in_tags_titles_and_strings() {
        let table = parse_table(
            "T: \"bank #1\"\nA: 0x0 'ctl #0' # title\nlabel str d \"a#b\" # note\n",
        )
        .unwrap();
        assert_eq!(table.groups()[0].tag.as_deref(), Some("bank #1"));
        assert_eq!(table.slot(0).unwrap().title.as_deref(), Some("ctl #0"));
        let label = table.fields().find(|f| f.name == "LABEL").unwrap();
        assert!(matches!(
            &label.kind,
            FieldKind::Scalar(ScalarKind::Str { init, .. }) if init == "a#b"
        ));
    }

    #[test]
    fn overlap_is_rejected_at_parse_time() {
        let err = parse_table("a 0x0 3 0 u y 0\nb 0x0 4 2 u y 0\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(
            err.kind,
            TableTextErrorKind::Model(ModelError::OverlappingFields { .. })
        ));
    }

    #[test]
    fn flags_are_case_insensitive() {
        let table = parse_table("a 0x0 7 0 S N 0x80\n").unwrap();
        let field = table.fields().next().unwrap();
        assert!(!field.is_access);
        assert_eq!(field.as_bits().unwrap().init_val, -128);
    }

    #[test]
    fn error_message_names_descriptor() {
        let err = parse_table("a 0x0 0 0 x y 0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "register descriptor: sign type flag must be 's' or 'u', found 'x'"
        );
    }
}
