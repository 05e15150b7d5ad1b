//! Field descriptors.
//!
//! A [`Field`] is either a bit range inside a 32-bit register word or a
//! scalar pseudo-field (`str`/`float`/`int`) that only exists in the text
//! representations. Both kinds share the name, access flag and comment.

use std::fmt;

use crate::numeric::{self, NumericError, WORD_BITS};

/// Placeholder name for unused bits. Exempt from per-slot name uniqueness.
pub const RESERVED_NAME: &str = "RESERVED";

/// Inclusive bit range `msb..=lsb` inside a 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitRange {
    msb: u32,
    lsb: u32,
}

impl BitRange {
    /// Builds a range, returning `None` unless `lsb <= msb <= 31`.
    #[must_use]
    pub const fn new(msb: u32, lsb: u32) -> Option<Self> {
        if lsb <= msb && msb < WORD_BITS {
            Some(Self { msb, lsb })
        } else {
            None
        }
    }

    /// The full 32-bit word.
    #[must_use]
    pub const fn full_word() -> Self {
        Self {
            msb: WORD_BITS - 1,
            lsb: 0,
        }
    }

    /// Most significant bit position.
    #[must_use]
    pub const fn msb(self) -> u32 {
        self.msb
    }

    /// Least significant bit position.
    #[must_use]
    pub const fn lsb(self) -> u32 {
        self.lsb
    }

    /// Number of bits covered.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.msb - self.lsb + 1
    }

    /// Word-positioned mask of the covered bits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn word_mask(self) -> u32 {
        (numeric::mask_of(self.width()) << self.lsb) as u32
    }

    /// Whether the two ranges share at least one bit.
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        self.lsb <= other.msb && other.lsb <= self.msb
    }

    /// Extracts the raw bits of this range from `word`.
    #[must_use]
    pub const fn extract(self, word: u32) -> u64 {
        ((word as u64) >> self.lsb) & numeric::mask_of(self.width())
    }

    /// Positions `value` (masked to the range width) inside a word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn place(self, value: i64) -> u32 {
        (numeric::mask(value, self.width()) << self.lsb) as u32
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msb == self.lsb {
            write!(f, "{}", self.msb)
        } else {
            write!(f, "{}_{}", self.msb, self.lsb)
        }
    }
}

/// Quoting applied to a string scalar when rendered as a pattern value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuoteStyle {
    /// `'value'`, declared with the token `s`.
    Single,
    /// `"value"`, declared with the token `d`.
    Double,
    /// No quoting. Keeps the declared token so export can reproduce it.
    Bare(String),
}

impl QuoteStyle {
    /// Maps the schema token to a quoting style.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "s" => Self::Single,
            "d" => Self::Double,
            other => Self::Bare(other.to_string()),
        }
    }

    /// Schema token for this style.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Single => "s",
            Self::Double => "d",
            Self::Bare(token) => token,
        }
    }

    /// Wraps `value` in the quote characters of this style.
    #[must_use]
    pub fn wrap(&self, value: &str) -> String {
        match self {
            Self::Single => format!("'{value}'"),
            Self::Double => format!("\"{value}\""),
            Self::Bare(_) => value.to_string(),
        }
    }
}

/// Strips one matching pair of surrounding quotes, if present.
#[must_use]
pub fn strip_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Value kind and default of a scalar pseudo-field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarKind {
    /// Free text.
    Str {
        /// Quoting used on output.
        quote: QuoteStyle,
        /// Default text without quotes.
        init: String,
    },
    /// Floating point number.
    Float(f64),
    /// Integer that is never packed.
    Int(i64),
}

impl ScalarKind {
    /// Schema keyword for this kind.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Str { .. } => "str",
            Self::Float(_) => "float",
            Self::Int(_) => "int",
        }
    }
}

/// A bit range at an address together with its numeric domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitField {
    /// Address of the owning word.
    pub addr: u32,
    /// Bits covered inside the word.
    pub range: BitRange,
    /// Two's-complement interpretation.
    pub is_signed: bool,
    /// Default value in the field's own domain.
    pub init_val: i64,
}

impl BitField {
    /// Builds a bit field after validating `init_val` against its domain.
    ///
    /// # Errors
    ///
    /// Returns the [`NumericError`] raised by the range check.
    pub fn new(
        addr: u32,
        range: BitRange,
        is_signed: bool,
        init_val: i64,
    ) -> Result<Self, NumericError> {
        numeric::check_range(init_val, is_signed, range.width())?;
        Ok(Self {
            addr,
            range,
            is_signed,
            init_val,
        })
    }

    /// Field width in bits.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.range.width()
    }

    /// Parses pattern text for this field.
    ///
    /// # Errors
    ///
    /// Propagates [`NumericError`] from the codec.
    pub fn parse_value(&self, text: &str) -> Result<i64, NumericError> {
        numeric::parse(text, self.is_signed, self.width())
    }

    /// Default value masked to the field width.
    #[must_use]
    pub const fn masked_init(&self) -> u64 {
        numeric::mask(self.init_val, self.width())
    }
}

/// Storage shape of a field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldKind {
    /// Packed into a register word.
    Bits(BitField),
    /// Text-only pseudo-field.
    Scalar(ScalarKind),
}

/// One named entry of the register table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    /// Canonical upper-case name.
    pub name: String,
    /// `false` pins the field to its default.
    pub is_access: bool,
    /// Display-only annotation.
    pub comment: Option<String>,
    /// Bit field or scalar.
    pub kind: FieldKind,
}

impl Field {
    /// Builds a packed bit field.
    #[must_use]
    pub fn bits(name: &str, bits: BitField, is_access: bool, comment: Option<String>) -> Self {
        Self {
            name: canonical_name(name),
            is_access,
            comment: comment.filter(|c| !c.is_empty()),
            kind: FieldKind::Bits(bits),
        }
    }

    /// Builds a scalar pseudo-field. Scalars are always accessible.
    #[must_use]
    pub fn scalar(name: &str, kind: ScalarKind, comment: Option<String>) -> Self {
        Self {
            name: canonical_name(name),
            is_access: true,
            comment: comment.filter(|c| !c.is_empty()),
            kind: FieldKind::Scalar(kind),
        }
    }

    /// The bit-field view, if this field is packed.
    #[must_use]
    pub const fn as_bits(&self) -> Option<&BitField> {
        match &self.kind {
            FieldKind::Bits(bits) => Some(bits),
            FieldKind::Scalar(_) => None,
        }
    }

    /// Whether the field is the `RESERVED` placeholder.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.name == RESERVED_NAME
    }

    /// Lower-case name as written to pattern files.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Canonical form of a field name.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    name.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, true)]
    #[case(31, 0, true)]
    #[case(3, 1, true)]
    #[case(1, 3, false)]
    #[case(32, 0, false)]
    fn bit_range_validation(#[case] msb: u32, #[case] lsb: u32, #[case] valid: bool) {
        assert_eq!(BitRange::new(msb, lsb).is_some(), valid);
    }

    #[test]
    fn bit_range_geometry() {
        let range = BitRange::new(7, 4).unwrap();
        assert_eq!(range.width(), 4);
        assert_eq!(range.word_mask(), 0xF0);
        assert_eq!(range.extract(0xABCD), 0xC);
        assert_eq!(range.place(-1), 0xF0);
        assert_eq!(range.to_string(), "7_4");
        assert_eq!(BitRange::new(5, 5).unwrap().to_string(), "5");
        assert_eq!(BitRange::full_word().word_mask(), 0xFFFF_FFFF);
    }

    #[rstest]
    #[case((3, 1), (0, 0), false)]
    #[case((3, 1), (1, 1), true)]
    #[case((7, 4), (5, 2), true)]
    #[case((31, 16), (15, 0), false)]
    fn overlap_detection(#[case] a: (u32, u32), #[case] b: (u32, u32), #[case] overlap: bool) {
        let a = BitRange::new(a.0, a.1).unwrap();
        let b = BitRange::new(b.0, b.1).unwrap();
        assert_eq!(a.overlaps(b), overlap);
        assert_eq!(b.overlaps(a), overlap);
    }

    #[test]
    fn bit_field_rejects_out_of_range_default() {
        let range = BitRange::new(3, 1).unwrap();
        assert!(BitField::new(0, range, false, 7).is_ok());
        assert!(BitField::new(0, range, false, 8).is_err());
        assert!(BitField::new(0, range, true, -4).is_ok());
        assert!(BitField::new(0, range, false, -1).is_err());
    }

    #[test]
    fn names_are_canonicalised() {
        let bits = BitField::new(0, BitRange::new(0, 0).unwrap(), false, 0).unwrap();
        let field = Field::bits(" enable ", bits, true, Some(String::new()));
        assert_eq!(field.name, "ENABLE");
        assert_eq!(field.display_name(), "enable");
        assert_eq!(field.comment, None);
    }

    #[rstest]
    #[case("'abc'", "abc")]
    #[case("\"abc\"", "abc")]
    #[case("abc", "abc")]
    #[case("'abc\"", "'abc\"")]
    #[case("'", "'")]
    fn quote_stripping(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_quotes(input), expected);
    }

    #[test]
    fn quote_styles_round_trip_tokens() {
        assert_eq!(QuoteStyle::from_token("s").wrap("x"), "'x'");
        assert_eq!(QuoteStyle::from_token("d").wrap("x"), "\"x\"");
        let bare = QuoteStyle::from_token("n");
        assert_eq!(bare.wrap("x"), "x");
        assert_eq!(bare.token(), "n");
    }
}
