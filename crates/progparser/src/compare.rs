//! Field-by-field comparison of two register tables.
//!
//! Addresses are walked in ascending order and fields are paired by lsb.
//! Comments never take part in the comparison, and a pair of `RESERVED`
//! placeholders is never reported.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use regmap_core::{BitField, Field, RegisterTable};

/// Attributes left out of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompareOptions {
    /// Ignore the sign flag.
    pub ignore_sign: bool,
    /// Ignore the access flag.
    pub ignore_access: bool,
}

/// The compared attributes of one bit field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    /// Canonical name.
    pub name: String,
    /// Word address.
    pub addr: u32,
    /// Highest bit.
    pub msb: u32,
    /// Lowest bit.
    pub lsb: u32,
    /// Sign flag.
    pub is_signed: bool,
    /// Access flag.
    pub is_access: bool,
    /// Default masked to the field width.
    pub init: u64,
}

impl FieldSummary {
    fn new(field: &Field, bits: &BitField) -> Self {
        Self {
            name: field.name.clone(),
            addr: bits.addr,
            msb: bits.range.msb(),
            lsb: bits.range.lsb(),
            is_signed: bits.is_signed,
            is_access: field.is_access,
            init: bits.masked_init(),
        }
    }

    fn matches(&self, other: &Self, options: CompareOptions) -> bool {
        self.name == other.name
            && self.addr == other.addr
            && self.msb == other.msb
            && self.lsb == other.lsb
            && self.init == other.init
            && (options.ignore_sign || self.is_signed == other.is_signed)
            && (options.ignore_access || self.is_access == other.is_access)
    }

    fn is_reserved(&self) -> bool {
        self.name == regmap_core::RESERVED_NAME
    }
}

/// One reported difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    /// Both tables hold a field at this lsb, with different attributes.
    Changed {
        /// Left-hand field.
        left: FieldSummary,
        /// Right-hand field.
        right: FieldSummary,
    },
    /// Only the left table holds the field.
    OnlyLeft(FieldSummary),
    /// Only the right table holds the field.
    OnlyRight(FieldSummary),
}

fn fields_by_lsb(table: &RegisterTable, addr: u32) -> BTreeMap<u32, FieldSummary> {
    table
        .bit_fields_at(addr)
        .map(|(field, bits)| (bits.range.lsb(), FieldSummary::new(field, bits)))
        .collect()
}

/// Lists every difference between `left` and `right`, in address then lsb
/// order.
#[must_use]
pub fn compare(
    left: &RegisterTable,
    right: &RegisterTable,
    options: CompareOptions,
) -> Vec<Difference> {
    let addresses: BTreeSet<u32> = left
        .slots()
        .iter()
        .chain(right.slots())
        .map(|slot| slot.addr)
        .collect();

    let mut diffs = Vec::new();
    for addr in addresses {
        let mut l_fields = fields_by_lsb(left, addr);
        let mut r_fields = fields_by_lsb(right, addr);
        let lsbs: BTreeSet<u32> = l_fields.keys().chain(r_fields.keys()).copied().collect();

        for lsb in lsbs {
            match (l_fields.remove(&lsb), r_fields.remove(&lsb)) {
                (Some(l), Some(r)) => {
                    if !l.matches(&r, options) && !(l.is_reserved() && r.is_reserved()) {
                        diffs.push(Difference::Changed { left: l, right: r });
                    }
                }
                (Some(l), None) if !l.is_reserved() => diffs.push(Difference::OnlyLeft(l)),
                (None, Some(r)) if !r.is_reserved() => diffs.push(Difference::OnlyRight(r)),
                _ => {}
            }
        }
    }
    diffs
}

/// Renders differences as an aligned report, or an empty string when there
/// are none.
///
/// Lines are prefixed `<!`/`>!` for the two sides of a changed field and
/// `<`/`>` for fields present on one side only.
#[must_use]
pub fn render_report(diffs: &[Difference]) -> String {
    let rows: Vec<(&str, &FieldSummary)> = diffs
        .iter()
        .flat_map(|diff| match diff {
            Difference::Changed { left, right } => vec![("<!", left), (">!", right)],
            Difference::OnlyLeft(field) => vec![("< ", field)],
            Difference::OnlyRight(field) => vec![("> ", field)],
        })
        .collect();
    if rows.is_empty() {
        return String::new();
    }

    let width = rows
        .iter()
        .map(|(_, field)| field.name.chars().count())
        .max()
        .unwrap_or_default()
        + 4;
    let rule = "=".repeat(width + 44);

    let mut out = String::new();
    let mut line = |text: String| {
        let _ = writeln!(out, "{}", text.trim_end());
    };
    line(format!("   {rule}"));
    line(format!(
        "   {:<width$}{:<8}{:<5}{:<5}{:<6}{:<8}{:<12}",
        "Register", "Addr", "MSB", "LSB", "Sign", "Access", "Initial"
    ));
    line(format!("   {rule}"));
    for (prefix, field) in rows {
        line(format!(
            "{prefix} {:<width$}{:<#8x}{:<5}{:<5}{:<6}{:<8}{:<#12x}",
            field.name.to_lowercase(),
            field.addr,
            field.msb,
            field.lsb,
            if field.is_signed { "s" } else { "u" },
            if field.is_access { "y" } else { "n" },
            field.init,
        ));
    }
    line(format!("   {rule}"));
    out
}
