//! Register table model and bit-field codec for the progparser toolchain.

/// Numeric literal parsing, range checks and rendering.
pub mod numeric;
pub use numeric::{check_range, mask, mask_of, normalize, sign_extend, NumericError, WORD_BITS};

/// Field descriptors: bit ranges, scalar pseudo-fields and access flags.
pub mod field;
pub use field::{BitField, BitRange, Field, FieldKind, QuoteStyle, ScalarKind, RESERVED_NAME};

/// Register table: address slots, display groups and hex-output set.
pub mod table;
pub use table::{AddressSlot, DisplayEntry, DisplayGroup, FieldId, ModelError, RegisterTable};

/// Named field value sets.
pub mod pattern;
pub use pattern::{Diagnostic, Pattern, PatternValue};

/// Value resolution and word packing against a table.
pub mod pack;
pub use pack::{
    pack_slot, pack_words, resolve_field, unpack_word, FieldValue, PackedWord, ValueError,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
