//! Sorted identifier tables backing the dense hashes of one level.

use std::collections::BTreeSet;

use fgeo_error::{GeoError, Result};
use fgeo_types::{ExpandedIdentifier, Identifier, IdentifierHash, MultiRange};
use tracing::{debug, error};

/// Bijection between the valid identifiers of one level and `[0, len)`.
///
/// The identifiers are stored sorted by raw value; the position of an
/// identifier is its hash.
#[derive(Debug, Clone, Default)]
pub struct HashTable {
    level: &'static str,
    ids: Vec<Identifier>,
}

impl HashTable {
    /// Enumerate `range`, pack every identifier and sort the result.
    ///
    /// Two coordinate tuples packing to the same identifier, an identifier
    /// that cannot be packed, or a count that differs from the range
    /// cardinality are all fatal.
    pub fn build(
        level: &'static str,
        range: &MultiRange,
        pack: impl Fn(&ExpandedIdentifier) -> Identifier,
    ) -> Result<Self> {
        let mut set = BTreeSet::new();
        for (position, expanded) in range.iter().enumerate() {
            let id = pack(&expanded);
            if !id.is_valid() {
                error!(
                    target: "fgeo.idhelpers::hash",
                    level,
                    expanded = %expanded,
                    "identifier not encodable while building hash table"
                );
                return Err(GeoError::PackingMismatch {
                    level,
                    hash: u32::try_from(position).unwrap_or(u32::MAX),
                    detail: format!("{expanded} is not encodable"),
                });
            }
            if !set.insert(id) {
                error!(
                    target: "fgeo.idhelpers::hash",
                    level,
                    id = %id,
                    expanded = %expanded,
                    "duplicate identifier while building hash table"
                );
                return Err(GeoError::DuplicateIdentifier { level, id: id.raw() });
            }
        }

        let expected = range.cardinality();
        let actual = set.len() as u64;
        if actual != expected {
            error!(
                target: "fgeo.idhelpers::hash",
                level,
                expected,
                actual,
                "hash table size differs from range cardinality"
            );
            return Err(GeoError::CardinalityMismatch {
                level,
                expected,
                actual,
            });
        }
        if IdentifierHash::from_index(set.len()).is_none() {
            return Err(GeoError::internal(format!(
                "{level} hash table has {actual} entries, more than a hash can address"
            )));
        }

        debug!(target: "fgeo.idhelpers::hash", level, size = actual, "built hash table");
        Ok(Self {
            level,
            ids: set.into_iter().collect(),
        })
    }

    pub fn level(&self) -> &'static str {
        self.level
    }

    /// Hash of `id`, or `None` if `id` is not a valid identifier of this level.
    pub fn hash(&self, id: Identifier) -> Option<IdentifierHash> {
        self.ids
            .binary_search(&id)
            .ok()
            .and_then(IdentifierHash::from_index)
    }

    /// Identifier at `hash`; [`Identifier::INVALID`] past the end.
    pub fn id(&self, hash: IdentifierHash) -> Identifier {
        self.ids
            .get(hash.index())
            .copied()
            .unwrap_or(Identifier::INVALID)
    }

    /// Bounds-checked variant of [`id`](Self::id).
    pub fn get_id(&self, hash: IdentifierHash) -> Result<Identifier> {
        self.ids
            .get(hash.index())
            .copied()
            .ok_or(GeoError::HashOutOfRange {
                hash: hash.get(),
                max: self.max(),
            })
    }

    /// Number of hashes; valid hashes are `0..max()`.
    pub fn max(&self) -> u32 {
        self.ids.len() as u32
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sorted identifiers of the level.
    pub fn ids(&self) -> &[Identifier] {
        &self.ids
    }

    /// Every `(hash, id)` pair in hash order.
    pub fn iter(&self) -> impl Iterator<Item = (IdentifierHash, Identifier)> + '_ {
        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| (IdentifierHash::new(i as u32), *id))
    }

    /// Check that `repack` reproduces every identifier of the table.
    pub fn verify(&self, repack: impl Fn(Identifier) -> Result<Identifier>) -> Result<()> {
        for (hash, id) in self.iter() {
            let again = repack(id)?;
            if again != id {
                return Err(GeoError::PackingMismatch {
                    level: self.level,
                    hash: hash.get(),
                    detail: format!("{id} repacked as {again}"),
                });
            }
            if self.hash(again) != Some(hash) {
                return Err(GeoError::PackingMismatch {
                    level: self.level,
                    hash: hash.get(),
                    detail: format!("{again} hashes back to a different slot"),
                });
            }
        }
        Ok(())
    }
}

/// Position of `expanded` in the enumeration order of `range`.
///
/// Used for levels that carry no hash table: the position is the number of
/// identifiers enumerated before it.
pub fn cardinality_position(range: &MultiRange, expanded: &ExpandedIdentifier) -> Option<u64> {
    let mut before = 0_u64;
    for candidate in range.ranges() {
        if candidate.contains_exact(expanded) {
            return candidate
                .cardinality_up_to(expanded)
                .map(|position| before + position);
        }
        before += candidate.cardinality();
    }
    None
}

/// Inverse of [`cardinality_position`].
pub fn expanded_at_position(range: &MultiRange, position: u64) -> Option<ExpandedIdentifier> {
    let mut rest = position;
    for candidate in range.ranges() {
        let size = candidate.cardinality();
        if rest < size {
            return candidate.expanded_at(rest);
        }
        rest -= size;
    }
    None
}
