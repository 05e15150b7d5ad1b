//! Register table model.
//!
//! Fields live in a single arena and are referenced by [`FieldId`] from two
//! independent orderings: address slots (packing order) and display groups
//! (source order, used for human-facing layouts). A table is built once by
//! a parser through the mutating methods here and is read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use thiserror::Error;

use crate::field::{canonical_name, BitField, Field, FieldKind};

/// Index of a field in the table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldId(usize);

/// Consistency violations detected while building a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A bit range outside `0 <= lsb <= msb <= 31`.
    #[error("invalid bit range {msb}:{lsb}, expected 0 <= lsb <= msb <= 31")]
    InvalidBitRange {
        /// Declared msb.
        msb: u32,
        /// Declared lsb.
        lsb: u32,
    },
    /// Two fields in one slot share bits.
    #[error("field '{name}' overlaps field '{other}' at address {addr:#x}")]
    OverlappingFields {
        /// Slot address.
        addr: u32,
        /// Field being added.
        name: String,
        /// Field already present.
        other: String,
    },
    /// A field name appears twice in one slot.
    #[error("field '{name}' is declared twice at address {addr:#x}")]
    DuplicateField {
        /// Slot address.
        addr: u32,
        /// Repeated name.
        name: String,
    },
    /// A reference to an address with no slot.
    #[error("address {0:#x} is not declared")]
    UnknownAddress(u32),
    /// An address declared twice where redeclaration is not allowed.
    #[error("address {0:#x} is declared twice")]
    DuplicateAddress(u32),
    /// Internal indices that do not resolve, as in a damaged table cache.
    #[error("inconsistent table: {0}")]
    Inconsistent(String),
}

/// One 32-bit addressable word and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressSlot {
    /// Word address.
    pub addr: u32,
    /// Display label.
    pub title: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldId>,
}

/// Entry of a display group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplayEntry {
    /// A field reference. `inserted` marks references added by `I:`.
    Field {
        /// Referenced field.
        id: FieldId,
        /// Added as a reference to an existing slot.
        inserted: bool,
    },
    /// Visual separator.
    Break,
}

/// Ordered, optionally tagged run of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayGroup {
    /// Section header.
    pub tag: Option<String>,
    /// Longest field name in the group, for column alignment.
    pub max_name_len: usize,
    /// Fields and breaks in source order.
    pub entries: Vec<DisplayEntry>,
}

impl DisplayGroup {
    fn push_field(&mut self, id: FieldId, name: &str, inserted: bool) {
        self.max_name_len = self.max_name_len.max(name.chars().count());
        self.entries.push(DisplayEntry::Field { id, inserted });
    }
}

/// The full register schema.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterTable {
    fields: Vec<Field>,
    slots: Vec<AddressSlot>,
    slot_index: BTreeMap<u32, usize>,
    groups: Vec<DisplayGroup>,
    hex_output: BTreeSet<String>,
}

impl RegisterTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new display group. Later fields are appended to it.
    pub fn open_group(&mut self, tag: Option<String>) {
        self.groups.push(DisplayGroup {
            tag,
            ..DisplayGroup::default()
        });
    }

    fn current_group(&mut self) -> &mut DisplayGroup {
        if self.groups.is_empty() {
            self.groups.push(DisplayGroup::default());
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    fn slot_mut(&mut self, addr: u32) -> &mut AddressSlot {
        let index = if let Some(&index) = self.slot_index.get(&addr) {
            index
        } else {
            if addr % 4 != 0 {
                warn!("address {addr:#x} is not word aligned");
            }
            self.slots.push(AddressSlot {
                addr,
                title: None,
                fields: Vec::new(),
            });
            self.slot_index.insert(addr, self.slots.len() - 1);
            self.slots.len() - 1
        };
        &mut self.slots[index]
    }

    /// Declares or reopens the slot at `addr`. A given title replaces the
    /// previous one.
    pub fn declare_slot(&mut self, addr: u32, title: Option<String>) {
        let slot = self.slot_mut(addr);
        if title.is_some() {
            slot.title = title;
        }
    }

    /// Declares the slot at `addr`, failing if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateAddress`].
    pub fn declare_new_slot(
        &mut self,
        addr: u32,
        title: Option<String>,
    ) -> Result<(), ModelError> {
        if self.slot_index.contains_key(&addr) {
            return Err(ModelError::DuplicateAddress(addr));
        }
        self.declare_slot(addr, title);
        Ok(())
    }

    /// Adds a field to the current display group and, for bit fields, to
    /// the slot at its address.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::OverlappingFields`] or
    /// [`ModelError::DuplicateField`] when the slot already holds a
    /// conflicting field.
    pub fn add_field(&mut self, field: Field) -> Result<FieldId, ModelError> {
        if let FieldKind::Bits(bits) = &field.kind {
            self.check_slot_conflicts(&field, bits)?;
        }

        let id = FieldId(self.fields.len());
        let name = field.name.clone();
        let addr = field.as_bits().map(|bits| bits.addr);
        self.fields.push(field);

        if let Some(addr) = addr {
            self.slot_mut(addr).fields.push(id);
        }
        self.current_group().push_field(id, &name, false);
        Ok(id)
    }

    fn check_slot_conflicts(&self, field: &Field, bits: &BitField) -> Result<(), ModelError> {
        for (other, other_bits) in self.bit_fields_at(bits.addr) {
            if !field.is_reserved() && other.name == field.name {
                return Err(ModelError::DuplicateField {
                    addr: bits.addr,
                    name: field.name.clone(),
                });
            }
            if other_bits.range.overlaps(bits.range) {
                return Err(ModelError::OverlappingFields {
                    addr: bits.addr,
                    name: field.name.clone(),
                    other: other.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Appends a visual break to the current display group.
    pub fn add_break(&mut self) {
        self.current_group().entries.push(DisplayEntry::Break);
    }

    /// Appends references to every field of the slot at `addr` to the
    /// current display group.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownAddress`] if no slot exists at `addr`.
    pub fn insert_slot_reference(&mut self, addr: u32) -> Result<(), ModelError> {
        let index = *self
            .slot_index
            .get(&addr)
            .ok_or(ModelError::UnknownAddress(addr))?;
        let refs: Vec<(FieldId, String)> = self.slots[index]
            .fields
            .iter()
            .map(|&id| (id, self.fields[id.0].name.clone()))
            .collect();
        let group = self.current_group();
        for (id, name) in refs {
            group.push_field(id, &name, true);
        }
        Ok(())
    }

    /// Marks a field name for hexadecimal text output.
    pub fn add_hex_output(&mut self, name: &str) {
        self.hex_output.insert(canonical_name(name));
    }

    /// Whether `field` renders in hexadecimal in text output.
    #[must_use]
    pub fn is_hex_output(&self, field: &Field) -> bool {
        self.hex_output.contains(&field.name)
    }

    /// Hex-output names in sorted order.
    pub fn hex_output(&self) -> impl Iterator<Item = &str> {
        self.hex_output.iter().map(String::as_str)
    }

    /// Looks up a field by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this table.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Number of fields, including scalars.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Slots in parse order.
    #[must_use]
    pub fn slots(&self) -> &[AddressSlot] {
        &self.slots
    }

    /// Slots in ascending address order.
    pub fn slots_by_address(&self) -> impl Iterator<Item = &AddressSlot> {
        self.slot_index.values().map(|&index| &self.slots[index])
    }

    /// The slot at `addr`, if declared.
    #[must_use]
    pub fn slot(&self, addr: u32) -> Option<&AddressSlot> {
        self.slot_index.get(&addr).map(|&index| &self.slots[index])
    }

    /// Bit fields of the slot at `addr`, in declaration order.
    pub fn bit_fields_at(&self, addr: u32) -> impl Iterator<Item = (&Field, &BitField)> {
        self.slot(addr)
            .into_iter()
            .flat_map(|slot| slot.fields.iter())
            .filter_map(|&id| {
                let field = &self.fields[id.0];
                field.as_bits().map(|bits| (field, bits))
            })
    }

    /// Display groups in source order.
    #[must_use]
    pub fn groups(&self) -> &[DisplayGroup] {
        &self.groups
    }

    /// Highest declared address.
    #[must_use]
    pub fn max_addr(&self) -> Option<u32> {
        self.slot_index.keys().next_back().copied()
    }

    /// Checks that every internal index resolves: slot lookups point at a
    /// slot with that address, and slot and group entries name fields that
    /// exist. Tables built through the mutating methods always pass; a
    /// deserialized table may not.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Inconsistent`] naming the first broken index.
    pub fn validate(&self) -> Result<(), ModelError> {
        let bad = |what: String| Err(ModelError::Inconsistent(what));

        for (&addr, &index) in &self.slot_index {
            match self.slots.get(index) {
                Some(slot) if slot.addr == addr => {}
                _ => return bad(format!("address {addr:#x} points at missing slot {index}")),
            }
        }
        if self.slot_index.len() != self.slots.len() {
            return bad(format!(
                "{} slots but {} indexed addresses",
                self.slots.len(),
                self.slot_index.len()
            ));
        }
        for slot in &self.slots {
            for id in &slot.fields {
                match self.fields.get(id.0).and_then(Field::as_bits) {
                    Some(bits) if bits.addr == slot.addr => {}
                    _ => {
                        return bad(format!(
                            "slot {:#x} references field {} which is not a bit field there",
                            slot.addr, id.0
                        ))
                    }
                }
            }
        }
        for group in &self.groups {
            for entry in &group.entries {
                if let DisplayEntry::Field { id, .. } = entry {
                    if id.0 >= self.fields.len() {
                        return bad(format!("display group references missing field {}", id.0));
                    }
                }
            }
        }
        Ok(())
    }

    /// Every word address from 0 through the highest declared address,
    /// stepping by 4.
    pub fn word_addresses(&self) -> impl Iterator<Item = u32> {
        let end = self.max_addr().map_or(0, |max| u64::from(max) + 4);
        (0..end)
            .step_by(4)
            .filter_map(|addr| u32::try_from(addr).ok())
    }
}
