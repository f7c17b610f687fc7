//! Identifier helpers for the FASER subdetectors.
//!
//! A helper is initialised once from an [`IdDictManager`] and is read-only
//! afterwards: packing, unpacking, hash lookups and neighbour queries take
//! `&self` and never lock.
//!
//! [`IdDictManager`]: fgeo_types::IdDictManager

pub mod cursor;
pub mod emulsion;
pub mod hit;
pub mod metrics;
pub mod sct;
pub mod table;

pub use cursor::{EmulsionIdentifier, SctIdentifier};
pub use emulsion::EmulsionId;
pub use hit::HitIdHelper;
pub use metrics::{IdHelperMetrics, IdHelperMetricsSnapshot};
pub use sct::FaserSctId;
pub use table::HashTable;

use fgeo_types::Identifier;
use serde::{Deserialize, Serialize};

/// Behaviour switches shared by all identifier helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdHelperConfig {
    /// Range-check every identifier built through the unchecked packers.
    pub do_checks: bool,
    /// Build the neighbour tables during initialisation.
    pub do_neighbours: bool,
}

impl Default for IdHelperConfig {
    fn default() -> Self {
        Self {
            do_checks: false,
            do_neighbours: true,
        }
    }
}

/// A packed identifier together with the outcome of its range check.
///
/// The identifier is always returned, even when the coordinates fall
/// outside the declared ranges; callers that care inspect `in_range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckedId {
    pub id: Identifier,
    pub in_range: bool,
}

impl CheckedId {
    /// The identifier if it passed the range check.
    pub const fn ok(self) -> Option<Identifier> {
        if self.in_range { Some(self.id) } else { None }
    }
}
