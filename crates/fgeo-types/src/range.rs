//! Declarative value ranges for identifier fields.
//!
//! A [`Range`] is one region of the identifier space: an ordered list of
//! per-field value sets whose Cartesian product is the set of valid
//! identifiers of that region. A [`MultiRange`] is a union of disjoint
//! ranges. Enumeration order is lexicographic in field order, which is also
//! the order of the packed identifiers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ExpandedIdentifier;

/// Legal values of one field within a range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeField {
    /// Any value; used for wildcard prefixes. Has no cardinality.
    Unbounded,
    /// Every integer in `[min, max]`.
    Bounded { min: i32, max: i32 },
    /// An explicit sorted, deduplicated list of values.
    Enumerated(Vec<i32>),
}

impl RangeField {
    pub const fn single(value: i32) -> Self {
        Self::Bounded {
            min: value,
            max: value,
        }
    }

    pub fn bounded(a: i32, b: i32) -> Self {
        Self::Bounded {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn enumerated(values: impl IntoIterator<Item = i32>) -> Self {
        let set: BTreeSet<i32> = values.into_iter().collect();
        Self::Enumerated(set.into_iter().collect())
    }

    pub fn contains(&self, value: i32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded { min, max } => (*min..=*max).contains(&value),
            Self::Enumerated(values) => values.binary_search(&value).is_ok(),
        }
    }

    /// Number of values; zero for `Unbounded`.
    pub fn cardinality(&self) -> u64 {
        match self {
            Self::Unbounded => 0,
            Self::Bounded { min, max } => (i64::from(*max) - i64::from(*min) + 1) as u64,
            Self::Enumerated(values) => values.len() as u64,
        }
    }

    pub fn minimum(&self) -> Option<i32> {
        match self {
            Self::Unbounded => None,
            Self::Bounded { min, .. } => Some(*min),
            Self::Enumerated(values) => values.first().copied(),
        }
    }

    pub fn maximum(&self) -> Option<i32> {
        match self {
            Self::Unbounded => None,
            Self::Bounded { max, .. } => Some(*max),
            Self::Enumerated(values) => values.last().copied(),
        }
    }

    /// Legal value immediately below `value`, if any.
    pub fn get_previous(&self, value: i32) -> Option<i32> {
        match self {
            Self::Unbounded => value.checked_sub(1),
            Self::Bounded { min, max } => {
                if value > *min && value <= *max {
                    Some(value - 1)
                } else {
                    None
                }
            }
            Self::Enumerated(values) => {
                let pos = values.binary_search(&value).ok()?;
                pos.checked_sub(1).map(|p| values[p])
            }
        }
    }

    /// Legal value immediately above `value`, if any.
    pub fn get_next(&self, value: i32) -> Option<i32> {
        match self {
            Self::Unbounded => value.checked_add(1),
            Self::Bounded { min, max } => {
                if value >= *min && value < *max {
                    Some(value + 1)
                } else {
                    None
                }
            }
            Self::Enumerated(values) => {
                let pos = values.binary_search(&value).ok()?;
                values.get(pos + 1).copied()
            }
        }
    }

    /// Position of `value` in ascending order.
    pub fn index_of(&self, value: i32) -> Option<u64> {
        match self {
            Self::Unbounded => None,
            Self::Bounded { min, max } => {
                (*min..=*max)
                    .contains(&value)
                    .then(|| (i64::from(value) - i64::from(*min)) as u64)
            }
            Self::Enumerated(values) => values.binary_search(&value).ok().map(|pos| pos as u64),
        }
    }

    /// Value at position `index` in ascending order.
    pub fn value_at(&self, index: u64) -> Option<i32> {
        match self {
            Self::Unbounded => None,
            Self::Bounded { min, .. } => {
                if index < self.cardinality() {
                    i32::try_from(i64::from(*min) + index as i64).ok()
                } else {
                    None
                }
            }
            Self::Enumerated(values) => usize::try_from(index)
                .ok()
                .and_then(|i| values.get(i).copied()),
        }
    }

    /// All values in ascending order (empty for `Unbounded`).
    pub fn values(&self) -> Vec<i32> {
        match self {
            Self::Unbounded => Vec::new(),
            Self::Bounded { min, max } => (*min..=*max).collect(),
            Self::Enumerated(values) => values.clone(),
        }
    }
}

/// One region of identifier space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    fields: Vec<RangeField>,
}

impl Range {
    pub fn new(fields: Vec<RangeField>) -> Self {
        Self { fields }
    }

    pub fn add_field(&mut self, field: RangeField) {
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&RangeField> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[RangeField] {
        &self.fields
    }

    /// Copy of the first `len` fields.
    #[must_use]
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            fields: self.fields[..len.min(self.fields.len())].to_vec(),
        }
    }

    /// Copy with field `index` replaced.
    #[must_use]
    pub fn with_field(&self, index: usize, field: RangeField) -> Self {
        let mut out = self.clone();
        if let Some(slot) = out.fields.get_mut(index) {
            *slot = field;
        }
        out
    }

    /// Product of the field cardinalities.
    pub fn cardinality(&self) -> u64 {
        if self.fields.is_empty() {
            return 0;
        }
        self.fields
            .iter()
            .fold(1_u64, |acc, field| acc.saturating_mul(field.cardinality()))
    }

    /// Whether every field present in both `id` and the range matches.
    ///
    /// Shorter identifiers match on the fields they carry, which makes this
    /// usable for prefix tests.
    pub fn contains(&self, id: &ExpandedIdentifier) -> bool {
        if id.is_empty() {
            return false;
        }
        self.fields
            .iter()
            .zip(id.as_slice())
            .all(|(field, value)| field.contains(*value))
    }

    /// Whether `id` carries exactly this range's fields and matches all of them.
    pub fn contains_exact(&self, id: &ExpandedIdentifier) -> bool {
        id.len() == self.fields.len() && self.contains(id)
    }

    /// Number of range identifiers ordered before `id`.
    ///
    /// `id` must carry every field of the range.
    pub fn cardinality_up_to(&self, id: &ExpandedIdentifier) -> Option<u64> {
        if id.len() < self.fields.len() || self.fields.is_empty() {
            return None;
        }
        let mut position = 0_u64;
        for (i, field) in self.fields.iter().enumerate() {
            let index = field.index_of(id[i])?;
            position = position * field.cardinality() + index;
        }
        Some(position)
    }

    /// Identifier at lexicographic position `index`.
    pub fn expanded_at(&self, index: u64) -> Option<ExpandedIdentifier> {
        if index >= self.cardinality() {
            return None;
        }
        let mut rest = index;
        let mut values = vec![0_i32; self.fields.len()];
        for (i, field) in self.fields.iter().enumerate().rev() {
            let card = field.cardinality();
            values[i] = field.value_at(rest % card)?;
            rest /= card;
        }
        Some(ExpandedIdentifier::from_slice(&values))
    }

    /// Enumerate every identifier of the range in lexicographic order.
    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            range: self,
            next: 0,
            total: self.cardinality(),
        }
    }
}

/// Identifier factory over a [`Range`].
#[derive(Debug, Clone)]
pub struct RangeIter<'a> {
    range: &'a Range,
    next: u64,
    total: u64,
}

impl Iterator for RangeIter<'_> {
    type Item = ExpandedIdentifier;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let out = self.range.expanded_at(self.next);
        self.next += 1;
        out
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.total - self.next).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

/// Union of disjoint [`Range`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRange {
    ranges: Vec<Range>,
}

impl MultiRange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a range unless an identical one is already present.
    pub fn add(&mut self, range: Range) {
        if !self.ranges.contains(&range) {
            self.ranges.push(range);
        }
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sum of the range cardinalities (ranges are assumed disjoint).
    pub fn cardinality(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0_u64, |acc, range| acc.saturating_add(range.cardinality()))
    }

    pub fn contains(&self, id: &ExpandedIdentifier) -> bool {
        self.ranges.iter().any(|range| range.contains(id))
    }

    pub fn contains_exact(&self, id: &ExpandedIdentifier) -> bool {
        self.ranges.iter().any(|range| range.contains_exact(id))
    }

    /// The range holding `id`, if any.
    pub fn find(&self, id: &ExpandedIdentifier) -> Option<&Range> {
        self.ranges.iter().find(|range| range.contains_exact(id))
    }

    /// Ranges matching `prefix`, with the prefix fields pinned to its values.
    #[must_use]
    pub fn restricted_to(&self, prefix: &ExpandedIdentifier) -> Self {
        let mut out = Self::new();
        for range in &self.ranges {
            if range.len() < prefix.len() || (!prefix.is_empty() && !range.contains(prefix)) {
                continue;
            }
            let mut pinned = range.clone();
            for (i, value) in prefix.as_slice().iter().enumerate() {
                pinned = pinned.with_field(i, RangeField::single(*value));
            }
            out.add(pinned);
        }
        out
    }

    /// Sorted union of the declared values of field `index`.
    pub fn field_values(&self, index: usize) -> Vec<i32> {
        let set: BTreeSet<i32> = self
            .ranges
            .iter()
            .filter_map(|range| range.field(index))
            .flat_map(RangeField::values)
            .collect();
        set.into_iter().collect()
    }

    /// Largest declared value of field `index`; `None` if any range leaves it unbounded.
    pub fn field_maximum(&self, index: usize) -> Option<i32> {
        let mut best: Option<i32> = None;
        for range in &self.ranges {
            let max = range.field(index)?.maximum()?;
            best = Some(best.map_or(max, |b| b.max(max)));
        }
        best
    }

    /// Smallest declared value of field `index`; `None` if any range leaves it unbounded.
    pub fn field_minimum(&self, index: usize) -> Option<i32> {
        let mut best: Option<i32> = None;
        for range in &self.ranges {
            let min = range.field(index)?.minimum()?;
            best = Some(best.map_or(min, |b| b.min(min)));
        }
        best
    }

    /// Enumerate all identifiers, range by range.
    pub fn iter(&self) -> impl Iterator<Item = ExpandedIdentifier> + '_ {
        self.ranges.iter().flat_map(Range::iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(values: &[i32]) -> ExpandedIdentifier {
        ExpandedIdentifier::from_slice(values)
    }

    #[test]
    fn field_neighbours() {
        let bounded = RangeField::bounded(0, 4);
        assert_eq!(bounded.get_previous(0), None);
        assert_eq!(bounded.get_previous(3), Some(2));
        assert_eq!(bounded.get_next(4), None);
        assert_eq!(bounded.get_next(3), Some(4));

        let eta = RangeField::enumerated([1, -1]);
        assert_eq!(eta, RangeField::Enumerated(vec![-1, 1]));
        assert_eq!(eta.get_next(-1), Some(1));
        assert_eq!(eta.get_previous(-1), None);
        assert_eq!(eta.get_next(0), None);
    }

    #[test]
    fn field_index_round_trip() {
        let field = RangeField::enumerated([-3, 0, 7]);
        for value in field.values() {
            let index = field.index_of(value).expect("declared value has index");
            assert_eq!(field.value_at(index), Some(value));
        }
        assert_eq!(field.index_of(1), None);
        assert_eq!(RangeField::Unbounded.cardinality(), 0);
    }

    #[test]
    fn range_enumerates_lexicographically() {
        let range = Range::new(vec![
            RangeField::single(1),
            RangeField::bounded(0, 1),
            RangeField::enumerated([-1, 1]),
        ]);
        let all: Vec<_> = range.iter().map(|id| id.as_slice().to_vec()).collect();
        assert_eq!(
            all,
            vec![vec![1, 0, -1], vec![1, 0, 1], vec![1, 1, -1], vec![1, 1, 1]]
        );
        assert_eq!(range.cardinality(), 4);
    }

    #[test]
    fn cardinality_up_to_inverts_expanded_at() {
        let range = Range::new(vec![
            RangeField::bounded(2, 4),
            RangeField::enumerated([-1, 1]),
            RangeField::bounded(0, 9),
        ]);
        for index in 0..range.cardinality() {
            let id = range.expanded_at(index).expect("index within cardinality");
            assert_eq!(range.cardinality_up_to(&id), Some(index));
        }
        assert_eq!(range.expanded_at(range.cardinality()), None);
        assert_eq!(range.cardinality_up_to(&ex(&[5, 1, 0])), None);
    }

    #[test]
    fn prefix_contains() {
        let range = Range::new(vec![RangeField::single(1), RangeField::bounded(0, 3)]);
        assert!(range.contains(&ex(&[1])));
        assert!(range.contains(&ex(&[1, 3])));
        assert!(!range.contains(&ex(&[1, 4])));
        assert!(!range.contains_exact(&ex(&[1])));
    }

    #[test]
    fn multirange_restriction_pins_prefix() {
        let mut multi = MultiRange::new();
        multi.add(Range::new(vec![
            RangeField::bounded(0, 1),
            RangeField::bounded(0, 2),
        ]));
        multi.add(Range::new(vec![RangeField::single(2), RangeField::bounded(0, 5)]));

        let restricted = multi.restricted_to(&ex(&[1]));
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted.cardinality(), 3);
        assert_eq!(restricted.field_maximum(1), Some(2));

        assert_eq!(multi.restricted_to(&ex(&[2])).field_maximum(1), Some(5));
        assert!(multi.restricted_to(&ex(&[3])).is_empty());
        assert_eq!(multi.field_values(0), vec![0, 1, 2]);
        assert_eq!(multi.cardinality(), 12);
    }

    #[test]
    fn multirange_dedups_identical_ranges() {
        let mut multi = MultiRange::new();
        let range = Range::new(vec![RangeField::bounded(0, 1)]);
        multi.add(range.clone());
        multi.add(range);
        assert_eq!(multi.len(), 1);
    }

    #[test]
    fn unbounded_field_has_no_maximum() {
        let mut multi = MultiRange::new();
        multi.add(Range::new(vec![RangeField::single(0), RangeField::Unbounded]));
        assert_eq!(multi.field_maximum(1), None);
        assert_eq!(multi.field_maximum(0), Some(0));
    }
}
