//! Schema export back to the text grammar or to a sheet.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use regmap_core::{
    AddressSlot, BitField, DisplayEntry, DisplayGroup, Field, FieldKind, Pattern, RegisterTable,
    ScalarKind, ValueError,
};

use crate::ini;
use crate::sheet::{
    ColorMap, Sheet, ADDR_COLUMN, BITS_COLUMN, FIRST_PATTERN_COLUMN, HEADER_SENTINEL,
    INIT_COLUMN, MEMBER_COLUMN, TERMINATOR_SENTINEL, TITLE_COLUMN,
};

/// Name of the all-defaults pattern written alongside an export.
pub const INITIAL_PATTERN_NAME: &str = "PAT-1";

/// First field row of an exported sheet.
const FIRST_FIELD_ROW: u32 = 8;

/// Options for [`to_sheet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetExportOptions {
    /// Add a pattern column holding every field's default.
    pub initial_pattern: bool,
    /// Fill addresses without a slot with a `RESERVED` 31..0 row.
    pub reserved_gaps: bool,
}

impl Default for SheetExportOptions {
    fn default() -> Self {
        Self {
            initial_pattern: false,
            reserved_gaps: true,
        }
    }
}

/// Renders `table` in the text schema grammar.
///
/// Parsing the result yields a table that packs every pattern to the same
/// words as `table`.
#[must_use]
pub fn to_text(table: &RegisterTable) -> String {
    let mut out = String::new();
    let mut first_tag = true;

    for group in table.groups() {
        if let Some(tag) = &group.tag {
            if !first_tag {
                out.push('\n');
            }
            first_tag = false;
            if tag.contains('#') {
                let _ = writeln!(out, "T: \"{tag}\"\n");
            } else {
                let _ = writeln!(out, "T: {tag}\n");
            }
        }
        write_group(&mut out, table, group);
    }

    let mut hex = table.hex_output().peekable();
    if hex.peek().is_some() {
        out.push_str("\n### Hex Out Reg ###\n\n");
    }
    for name in hex {
        let _ = writeln!(out, "H: {}", name.to_lowercase());
    }
    out.push('\n');

    let mut first_title = true;
    for slot in table.slots() {
        if slot.title.is_none() && !slot.fields.is_empty() {
            continue;
        }
        if first_title {
            first_title = false;
            out.push_str("### Register Title ###\n\n");
        }
        out.push_str("A: ");
        pad(&mut out, &format!("{:#x}", slot.addr), 8);
        if let Some(title) = &slot.title {
            let _ = write!(out, "\"{title}\"");
        }
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Column width for names: the group maximum rounded up to the next
/// multiple of 4, always leaving at least one space.
const fn name_width(max_len: usize) -> usize {
    (max_len / 4 + 1) * 4
}

fn write_group(out: &mut String, table: &RegisterTable, group: &DisplayGroup) {
    let width = name_width(group.max_name_len);
    let mut inserted_addr = None;

    for entry in &group.entries {
        let (id, inserted) = match *entry {
            DisplayEntry::Break => {
                inserted_addr = None;
                out.push_str("<br>\n");
                continue;
            }
            DisplayEntry::Field { id, inserted } => (id, inserted),
        };
        let field = table.field(id);

        if inserted {
            if let Some(addr) = field.as_bits().map(|bits| bits.addr) {
                if inserted_addr != Some(addr) {
                    inserted_addr = Some(addr);
                    let _ = writeln!(out, "I: {addr:#x}");
                }
            }
            continue;
        }
        inserted_addr = None;
        write_field(out, field, width);
    }
}

fn write_field(out: &mut String, field: &Field, width: usize) {
    pad(out, &field.display_name(), width);
    match &field.kind {
        FieldKind::Bits(bits) => {
            pad(out, &format!("{:#x}", bits.addr), 8);
            pad(out, &bits.range.msb().to_string(), 4);
            pad(out, &bits.range.lsb().to_string(), 4);
            pad(out, if bits.is_signed { "s" } else { "u" }, 4);
            pad(out, if field.is_access { "y" } else { "n" }, 4);
            pad(out, &format!("{:#x}", bits.masked_init()), 12);
        }
        FieldKind::Scalar(kind) => {
            pad(out, kind.keyword(), 8);
            match kind {
                ScalarKind::Str { quote, init } => {
                    pad(out, quote.token(), 4);
                    out.push_str(&quote.wrap(init));
                }
                ScalarKind::Float(init) => {
                    let _ = write!(out, "{init:?}");
                }
                ScalarKind::Int(init) => {
                    let _ = write!(out, "{init}");
                }
            }
            out.push(' ');
        }
    }

    match &field.comment {
        Some(comment) => {
            let _ = writeln!(out, "\"{comment}\"");
        }
        None => {
            let trimmed = out.trim_end_matches(' ').len();
            out.truncate(trimmed);
            out.push('\n');
        }
    }
}

/// Appends `text` left-aligned in `width` columns, followed by at least one
/// space.
fn pad(out: &mut String, text: &str, width: usize) {
    let width = width.max(text.chars().count() + 1);
    let _ = write!(out, "{text:<width$}");
}

/// Renders the all-defaults pattern as INI text.
///
/// # Errors
///
/// Propagates [`ValueError`] from the INI encoder.
pub fn initial_ini(table: &RegisterTable) -> Result<String, ValueError> {
    let pattern = Pattern::defaults(INITIAL_PATTERN_NAME, table);
    ini::encode(table, &pattern, &mut Vec::new())
}

/// Lays `table` out as a sheet schema.
///
/// Addresses ascend in steps of 4; fields of one address are sorted by
/// lsb. Scalars have no address and are not exported.
#[must_use]
pub fn to_sheet(table: &RegisterTable, options: SheetExportOptions, colors: &ColorMap) -> Sheet {
    let mut sheet = Sheet::new();
    write_header(&mut sheet, options.initial_pattern);

    let addresses: BTreeSet<u32> = table
        .word_addresses()
        .chain(table.slots().iter().map(|slot| slot.addr))
        .collect();

    let mut row = FIRST_FIELD_ROW;
    for addr in addresses {
        match table.slot(addr) {
            Some(slot) => row = write_slot(&mut sheet, table, slot, row, options, colors),
            None if options.reserved_gaps => {
                write_reserved_gap(&mut sheet, addr, row, options, colors);
                row += 1;
            }
            None => {}
        }
    }

    sheet.put(row, ADDR_COLUMN, TERMINATOR_SENTINEL, None);
    row += 2;
    sheet.put(row, ADDR_COLUMN, "Blue INI: ", Some(colors.signed));
    sheet.put(row, TITLE_COLUMN, "signed register", Some(colors.signed));
    row += 1;
    sheet.put(row, ADDR_COLUMN, "Grey Member: ", Some(colors.soft));
    sheet.put(row, TITLE_COLUMN, "private register", Some(colors.soft));
    sheet
}

fn write_header(sheet: &mut Sheet, initial_pattern: bool) {
    for (row, label) in (2..).zip(["Chip", "Eng.", "Date", "BaseAddr"]) {
        sheet.put(row, ADDR_COLUMN, label, None);
    }
    let labels = ["Number", "FileName", "Mention1", "Mention2", "Mention3", "PatternStatus"];
    for (row, label) in (1..).zip(labels) {
        sheet.put(row, MEMBER_COLUMN, label, None);
    }
    let header = FIRST_FIELD_ROW - 1;
    sheet.put(header, ADDR_COLUMN, HEADER_SENTINEL, None);
    sheet.put(header, TITLE_COLUMN, "Register", None);
    sheet.put(header, INIT_COLUMN, "INI", None);
    sheet.put(header, BITS_COLUMN, "Bits", None);
    sheet.put(header, MEMBER_COLUMN, "Member", None);

    if initial_pattern {
        sheet.put(1, FIRST_PATTERN_COLUMN, FIRST_PATTERN_COLUMN.to_string(), None);
        sheet.put(2, FIRST_PATTERN_COLUMN, INITIAL_PATTERN_NAME, None);
    }
}

fn write_slot(
    sheet: &mut Sheet,
    table: &RegisterTable,
    slot: &AddressSlot,
    mut row: u32,
    options: SheetExportOptions,
    colors: &ColorMap,
) -> u32 {
    sheet.put(row, ADDR_COLUMN, format!("{:#x}", slot.addr), None);
    if let Some(title) = &slot.title {
        sheet.put(row, TITLE_COLUMN, title.clone(), None);
    }

    let mut fields: Vec<(&Field, &BitField)> = table.bit_fields_at(slot.addr).collect();
    if fields.is_empty() {
        return row + 1;
    }
    fields.sort_by_key(|(_, bits)| bits.range.lsb());

    for (field, bits) in fields {
        let soft = (!field.is_access).then_some(colors.soft);
        let signed = bits.is_signed.then_some(colors.signed);
        let init = bits.masked_init();

        sheet.put(row, INIT_COLUMN, format!("{init:#x}"), signed);
        sheet.put(row, BITS_COLUMN, bits.range.to_string(), None);
        sheet.put(row, MEMBER_COLUMN, member_text(field), soft);
        if options.initial_pattern {
            sheet.put(row, FIRST_PATTERN_COLUMN, format!("{init:X}"), soft);
        }
        sheet.set_row_font(row, soft);
        row += 1;
    }
    row
}

fn member_text(field: &Field) -> String {
    if field.is_reserved() {
        return field.display_name();
    }
    let mut lines = vec![field.name.clone()];
    if let Some(comment) = &field.comment {
        lines.extend(comment.split(',').map(|part| part.trim().to_string()));
    }
    lines.join("\n")
}

fn write_reserved_gap(
    sheet: &mut Sheet,
    addr: u32,
    row: u32,
    options: SheetExportOptions,
    colors: &ColorMap,
) {
    let soft = Some(colors.soft);
    sheet.put(row, ADDR_COLUMN, format!("{addr:#x}"), None);
    sheet.put(row, TITLE_COLUMN, "reserved", None);
    sheet.put(row, INIT_COLUMN, "0x0", None);
    sheet.put(row, BITS_COLUMN, "31_0", None);
    sheet.put(row, MEMBER_COLUMN, "reserved", soft);
    if options.initial_pattern {
        sheet.put(row, FIRST_PATTERN_COLUMN, "0", soft);
    }
    sheet.set_row_font(row, soft);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{table_sheet, table_text};
    use regmap_core::pack_words;

    const SCHEMA: &str = "\
T: core
A: 0x0 \"control\"
enable 0x0 0 0 u y 0  # enable bit
mode   0x0 3 1 u y 2  \"operating mode, sticky\"
<br>
gain   0x8 7 0 s n -3
T: misc
label  str s hello world
ratio  float 1.5 scale
T: alias
I: 0x0
H: mode
";

    fn defaults_words(table: &RegisterTable) -> Vec<regmap_core::PackedWord> {
        pack_words(table, &Pattern::defaults("d", table), &mut Vec::new()).unwrap()
    }

    #[test]
    fn text_export_layout() {
        let table = table_text::parse_table(SCHEMA).unwrap();
        let expected = "\
T: core

enable  0x0     0   0   u   y   0x0
mode    0x0     3   1   u   y   0x2         \"operating mode, sticky\"
<br>
gain    0x8     7   0   s   n   0xfd
T: misc

label   str     s   'hello world'
ratio   float   1.5 \"scale\"

T: alias

I: 0x0

### Hex Out Reg ###

H: mode

### Register Title ###

A: 0x0     \"control\"

";
        assert_eq!(to_text(&table), expected);
    }

    #[test]
    fn text_export_reparses_to_same_words() {
        let table = table_text::parse_table(SCHEMA).unwrap();
        let again = table_text::parse_table(&to_text(&table)).unwrap();
        assert_eq!(defaults_words(&again), defaults_words(&table));
        assert_eq!(to_text(&again), to_text(&table));
        assert_eq!(again.groups()[2].entries.len(), 2);
    }

    #[test]
    fn text_export_keeps_hash_inside_comments() {
        let source = "T: \"bank #1\"\nmode 0x0 3 1 u y 2 \"see #3 below\"\nA: 0x0 \"ctl #0\"\n";
        let table = table_text::parse_table(source).unwrap();
        let again = table_text::parse_table(&to_text(&table)).unwrap();

        let mode = again.fields().next().unwrap();
        assert_eq!(mode.comment.as_deref(), Some("see #3 below"));
        assert_eq!(again.groups()[0].tag.as_deref(), Some("bank #1"));
        assert_eq!(again.slot(0).unwrap().title.as_deref(), Some("ctl #0"));
    }

    #[test]
    fn name_width_always_leaves_a_gap() {
        assert_eq!(name_width(6), 8);
        assert_eq!(name_width(8), 12);
        assert_eq!(name_width(0), 4);
    }

    #[test]
    fn sheet_export_reparses_to_same_words() {
        let table = table_text::parse_table(SCHEMA).unwrap();
        let colors = ColorMap::default();
        let sheet = to_sheet(&table, SheetExportOptions::default(), &colors);
        let again = table_sheet::parse_table(&sheet, &colors).unwrap();
        assert_eq!(defaults_words(&again), defaults_words(&table));

        let mode = again.fields().find(|f| f.name == "MODE").unwrap();
        assert_eq!(mode.comment.as_deref(), Some("operating mode, sticky"));
        let gain = again.fields().find(|f| f.name == "GAIN").unwrap();
        assert!(!gain.is_access);
        assert!(gain.as_bits().unwrap().is_signed);
    }

    #[test]
    fn sheet_export_fills_gaps_and_initial_column() {
        let table = table_text::parse_table(SCHEMA).unwrap();
        let colors = ColorMap::default();
        let options = SheetExportOptions {
            initial_pattern: true,
            reserved_gaps: true,
        };
        let sheet = to_sheet(&table, options, &colors);

        assert_eq!(sheet.text(7, ADDR_COLUMN), Some(HEADER_SENTINEL));
        assert_eq!(sheet.text(2, FIRST_PATTERN_COLUMN), Some(INITIAL_PATTERN_NAME));
        // 0x0 holds two rows, 0x4 is a gap, 0x8 holds gain.
        assert_eq!(sheet.text(8, FIRST_PATTERN_COLUMN), Some("0"));
        assert_eq!(sheet.text(9, FIRST_PATTERN_COLUMN), Some("2"));
        assert_eq!(sheet.text(10, ADDR_COLUMN), Some("0x4"));
        assert_eq!(sheet.text(10, MEMBER_COLUMN), Some("reserved"));
        assert_eq!(sheet.font(10, MEMBER_COLUMN), Some(colors.soft));
        assert_eq!(sheet.text(11, FIRST_PATTERN_COLUMN), Some("FD"));
        assert_eq!(sheet.text(12, ADDR_COLUMN), Some(TERMINATOR_SENTINEL));

        let reparsed = table_sheet::parse_table(&sheet, &colors).unwrap();
        assert_eq!(defaults_words(&reparsed), defaults_words(&table));
    }

    #[test]
    fn sheet_export_without_gaps_skips_missing_addresses() {
        let table = table_text::parse_table(SCHEMA).unwrap();
        let options = SheetExportOptions {
            initial_pattern: false,
            reserved_gaps: false,
        };
        let sheet = to_sheet(&table, options, &ColorMap::default());
        assert_eq!(sheet.text(10, ADDR_COLUMN), Some("0x8"));
        assert_eq!(sheet.text(11, ADDR_COLUMN), Some(TERMINATOR_SENTINEL));
    }

    #[test]
    fn initial_ini_holds_defaults() {
        let table = table_text::parse_table(SCHEMA).unwrap();
        let text = initial_ini(&table).unwrap();
        assert!(text.starts_with("[core]\nenable = 0"));
        assert!(text.contains("mode = 0x0002"));
        assert!(text.contains("label = 'hello world'"));
        assert!(!text.contains("gain"));
    }
}
