pub mod codec;
pub mod dictionary;
pub mod faser;
pub mod range;

pub use codec::FieldCodec;
pub use dictionary::{EntrySpec, FieldDef, IdDictManager, IdDictionary, RegionDef, RegionEntry};
pub use faser::DetectorTechnology;
pub use range::{MultiRange, Range, RangeField};

use std::fmt;
use std::ops::Index;

use smallvec::SmallVec;

/// Compact, bit-packed identifier of one element of the detector hierarchy.
///
/// Field values are packed most-significant-first in dictionary order, so the
/// integer order of identifiers equals the lexicographic order of their
/// expanded field values. The layout is persisted in event and conditions
/// data and must stay stable for a given dictionary version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Identifier(u64);

impl Identifier {
    /// All bits set. Never produced by packing: dictionaries use at most 63 bits.
    pub const INVALID: Self = Self(u64::MAX);

    /// Identifier with every field bit cleared, the starting point for packing.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{:#018x}", self.0)
        } else {
            f.write_str("[invalid]")
        }
    }
}

/// Dense zero-based index over the sorted valid identifiers of one level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct IdentifierHash(u32);

impl IdentifierHash {
    /// Sentinel stored in neighbour tables and returned for unknown identifiers.
    pub const INVALID: Self = Self(u32::MAX);

    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Convert a table index into a hash.
    ///
    /// Returns `None` if the index does not fit below the sentinel.
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .filter(|value| *value != u32::MAX)
            .map(Self)
    }

    /// `Some(self)` unless this is the sentinel.
    #[inline]
    pub const fn valid(self) -> Option<Self> {
        if self.is_valid() { Some(self) } else { None }
    }
}

impl Default for IdentifierHash {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for IdentifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("[invalid]")
        }
    }
}

/// Human-readable counterpart of an [`Identifier`]: one value per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpandedIdentifier {
    fields: SmallVec<[i32; 8]>,
}

impl ExpandedIdentifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(values: &[i32]) -> Self {
        Self {
            fields: SmallVec::from_slice(values),
        }
    }

    #[inline]
    pub fn push(&mut self, value: i32) {
        self.fields.push(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<i32> {
        self.fields.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: i32) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = value;
        }
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.fields
    }

    /// The first `len` fields.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self::from_slice(&self.fields[..len.min(self.fields.len())])
    }

    /// Whether `self` starts with every field of `other`.
    pub fn starts_with(&self, other: &Self) -> bool {
        self.fields.starts_with(&other.fields)
    }
}

impl Index<usize> for ExpandedIdentifier {
    type Output = i32;

    fn index(&self, index: usize) -> &i32 {
        &self.fields[index]
    }
}

impl From<&[i32]> for ExpandedIdentifier {
    fn from(values: &[i32]) -> Self {
        Self::from_slice(values)
    }
}

impl FromIterator<i32> for ExpandedIdentifier {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ExpandedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Inclusive window of field indices a generic lookup operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdContext {
    pub begin: usize,
    pub end: usize,
}

impl IdContext {
    #[must_use]
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// Number of fields covered by the window.
    pub const fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.begin)
    }

    pub const fn is_empty(&self) -> bool {
        self.end < self.begin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validity() {
        assert!(!Identifier::INVALID.is_valid());
        assert!(!Identifier::default().is_valid());
        assert!(Identifier::ZERO.is_valid());
        assert_eq!(Identifier::from_raw(0x1234).raw(), 0x1234);
        assert_eq!(Identifier::INVALID.to_string(), "[invalid]");
        assert_eq!(Identifier::from_raw(0x10).to_string(), "0x0000000000000010");
    }

    #[test]
    fn identifier_orders_by_raw_value() {
        let mut ids = vec![
            Identifier::from_raw(30),
            Identifier::from_raw(10),
            Identifier::from_raw(20),
        ];
        ids.sort();
        assert_eq!(
            ids.iter().map(|id| id.raw()).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
    }

    #[test]
    fn hash_sentinel() {
        assert!(!IdentifierHash::INVALID.is_valid());
        assert_eq!(IdentifierHash::INVALID.valid(), None);
        assert_eq!(IdentifierHash::new(3).valid(), Some(IdentifierHash::new(3)));
        assert_eq!(IdentifierHash::from_index(7), Some(IdentifierHash::new(7)));
        assert_eq!(IdentifierHash::from_index(u32::MAX as usize), None);
    }

    #[test]
    fn expanded_identifier_display_and_prefix() {
        let expanded = ExpandedIdentifier::from_slice(&[1, 1, 3, 7, 0]);
        assert_eq!(expanded.to_string(), "1/1/3/7/0");
        assert_eq!(expanded.prefix(2).as_slice(), &[1, 1]);
        assert!(expanded.starts_with(&expanded.prefix(3)));
        assert_eq!(expanded[3], 7);
        assert_eq!(expanded.get(5), None);
    }

    #[test]
    fn expanded_identifier_lexicographic_order() {
        let a = ExpandedIdentifier::from_slice(&[1, 1, 0, 9]);
        let b = ExpandedIdentifier::from_slice(&[1, 1, 1, 0]);
        assert!(a < b);
    }

    #[test]
    fn context_len() {
        assert_eq!(IdContext::new(0, 3).len(), 4);
        assert!(!IdContext::new(2, 2).is_empty());
    }
}
