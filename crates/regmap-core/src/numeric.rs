//! Numeric literal codec with explicit sign and width semantics.
//!
//! Register values travel as text in every external representation. This
//! module is the single place where such text becomes an integer and back:
//!
//! - `0x`/`0X` literals are raw bit patterns. They must fit in `bits`
//!   unsigned bits and are sign-extended when the field is signed.
//! - Decimal literals are taken at face value. A signed field keeps one bit
//!   for the sign; a negative decimal is never valid for an unsigned field.
//!
//! Rendering masks the value to the field width first, so any two integers
//! that agree modulo `2^bits` render identically.

use thiserror::Error;

/// Width of one addressable register word.
pub const WORD_BITS: u32 = 32;

/// Errors produced while converting a literal to an integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumericError {
    /// The text is not a decimal or `0x` hexadecimal literal.
    #[error("invalid numeric literal '{0}'")]
    InvalidLiteral(String),
    /// The value does not fit in the declared width.
    #[error("number overflow: '{text}' does not fit a {bits}-bit {} field", domain(.signed))]
    Overflow {
        /// The offending literal.
        text: String,
        /// Declared field width.
        bits: u32,
        /// Whether the field is signed.
        signed: bool,
    },
    /// A negative decimal was supplied for an unsigned field.
    #[error("negative value '{0}' found in unsigned mode")]
    Sign(String),
    /// The requested width is outside `1..=32`.
    #[error("unsupported field width {0}")]
    InvalidWidth(u32),
}

const fn domain(signed: &bool) -> &'static str {
    if *signed {
        "signed"
    } else {
        "unsigned"
    }
}

/// Parses `text` as a value for a field of the given sign and width.
///
/// # Errors
///
/// Returns [`NumericError::Overflow`] when the magnitude exceeds `bits`,
/// [`NumericError::Sign`] for a negative decimal in unsigned mode, and
/// [`NumericError::InvalidLiteral`] for anything that is not a number.
pub fn parse(text: &str, signed: bool, bits: u32) -> Result<i64, NumericError> {
    check_width(bits)?;
    let literal = text.trim();

    match literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        Some(digits) => parse_hex(literal, digits, signed, bits),
        None => parse_decimal(literal, signed, bits),
    }
}

/// Parses an unsigned 32-bit quantity such as an address or a bit index.
///
/// # Errors
///
/// Same conditions as [`parse`] with `signed = false` and `bits = 32`.
pub fn parse_u32(text: &str) -> Result<u32, NumericError> {
    let value = parse(text, false, WORD_BITS)?;
    u32::try_from(value).map_err(|_| NumericError::Overflow {
        text: text.trim().to_string(),
        bits: WORD_BITS,
        signed: false,
    })
}

/// Checks that an already numeric value is representable in the field.
///
/// Applies the decimal-literal rules: signed fields accept
/// `-2^(bits-1)..2^(bits-1)`, unsigned fields accept `0..2^bits`.
///
/// # Errors
///
/// Returns [`NumericError::Sign`] or [`NumericError::Overflow`].
pub fn check_range(value: i64, signed: bool, bits: u32) -> Result<i64, NumericError> {
    check_width(bits)?;
    if !signed && value < 0 {
        return Err(NumericError::Sign(value.to_string()));
    }

    let magnitude_bits = if signed { bits - 1 } else { bits };
    let limit = 1u64 << magnitude_bits;
    let magnitude = value.unsigned_abs();
    let overflow = if value >= 0 {
        magnitude >= limit
    } else {
        magnitude > limit
    };

    if overflow {
        return Err(NumericError::Overflow {
            text: value.to_string(),
            bits,
            signed,
        });
    }
    Ok(value)
}

fn parse_hex(literal: &str, digits: &str, signed: bool, bits: u32) -> Result<i64, NumericError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(NumericError::InvalidLiteral(literal.to_string()));
    }

    let overflow = || NumericError::Overflow {
        text: literal.to_string(),
        bits,
        signed,
    };
    let raw = u64::from_str_radix(digits, 16).map_err(|_| overflow())?;
    if raw >> bits != 0 {
        return Err(overflow());
    }

    if signed {
        Ok(sign_extend(raw, bits))
    } else {
        i64::try_from(raw).map_err(|_| overflow())
    }
}

fn parse_decimal(literal: &str, signed: bool, bits: u32) -> Result<i64, NumericError> {
    let value = literal.parse::<i64>().map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            NumericError::Overflow {
                text: literal.to_string(),
                bits,
                signed,
            }
        }
        _ => NumericError::InvalidLiteral(literal.to_string()),
    })?;

    if !signed && value < 0 {
        return Err(NumericError::Sign(literal.to_string()));
    }
    check_range(value, signed, bits).map_err(|e| match e {
        NumericError::Overflow { bits, signed, .. } => NumericError::Overflow {
            text: literal.to_string(),
            bits,
            signed,
        },
        other => other,
    })
}

const fn check_width(bits: u32) -> Result<(), NumericError> {
    if bits == 0 || bits > WORD_BITS {
        Err(NumericError::InvalidWidth(bits))
    } else {
        Ok(())
    }
}

/// All-ones mask covering the low `bits` bits.
#[must_use]
pub const fn mask_of(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Two's-complement truncation of `value` to `bits` bits.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn mask(value: i64, bits: u32) -> u64 {
    (value as u64) & mask_of(bits)
}

/// Sign-extends the low `bits` of `raw` to a full `i64`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Reduces `value` into the field's own domain.
///
/// Unsigned fields get `value mod 2^bits`; signed fields get the
/// two's-complement reinterpretation of the masked bits.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn normalize(value: i64, bits: u32, signed: bool) -> i64 {
    let raw = mask(value, bits);
    if signed {
        sign_extend(raw, bits)
    } else {
        raw as i64
    }
}

/// Renders `value` for a field of `bits` bits.
///
/// Hex output is the masked bit pattern: `0x` plus 4 digits, or 8 digits once
/// the pattern no longer fits in 16 bits. Decimal output is the value reduced
/// into the field's domain so it parses back to the same integer.
#[must_use]
pub fn format(value: i64, bits: u32, signed: bool, as_hex: bool) -> String {
    if as_hex {
        let raw = mask(value, bits);
        if raw > 0xFFFF {
            format!("{raw:#010x}")
        } else {
            format!("{raw:#06x}")
        }
    } else {
        normalize(value, bits, signed).to_string()
    }
}
