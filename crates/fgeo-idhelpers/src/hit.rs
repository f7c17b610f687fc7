//! Compact 32-bit identifiers for simulated emulsion hits.
//!
//! Hits are written with a fixed layout that predates the offline
//! dictionary, so the field widths depend on the dictionary version the
//! emulsion helper reports. Film occupies the lowest bits.

use fgeo_error::{GeoError, Result};
use fgeo_types::codec::bits_for;
use fgeo_types::{FieldCodec, Identifier};
use tracing::debug;

use crate::EmulsionId;

/// Dictionary version whose hits use the narrow layout.
pub const LEGACY_VERSION: &str = "FASERNU-03-770";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldRange {
    min: i32,
    max: i32,
}

const LEGACY: [FieldRange; 3] = [
    FieldRange { min: 0, max: 1 },
    FieldRange { min: 0, max: 34 },
    FieldRange { min: 0, max: 21 },
];

const CURRENT: [FieldRange; 3] = [
    FieldRange { min: 0, max: 1 },
    FieldRange { min: 0, max: 127 },
    FieldRange { min: 0, max: 63 },
];

fn codec(name: &str, index: usize, range: FieldRange, shift: u32) -> FieldCodec {
    let bits = bits_for((i64::from(range.max) - i64::from(range.min) + 1) as u64);
    FieldCodec::bounded(name, index, bits, shift, range.min)
}

#[derive(Debug, Clone)]
pub struct HitIdHelper {
    legacy: bool,
    film: FieldCodec,
    base: FieldCodec,
    module: FieldCodec,
}

impl HitIdHelper {
    /// Layout for the dictionary `version`.
    pub fn for_version(version: &str) -> Self {
        let legacy = version == LEGACY_VERSION;
        let ranges = if legacy { LEGACY } else { CURRENT };
        let [film, base, module] = ranges;
        let film = codec("film", 0, film, 0);
        let base = codec("base", 1, base, film.bits());
        let module = codec("module", 2, module, base.shift() + base.bits());
        debug!(target: "fgeo.idhelpers::hit", version, legacy, "hit identifier layout selected");
        Self {
            legacy,
            film,
            base,
            module,
        }
    }

    /// Layout matching the dictionary `helper` was initialised from.
    pub fn for_helper(helper: &EmulsionId) -> Self {
        Self::for_version(helper.dictionary_version())
    }

    pub const fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// Pack a hit identifier; fails when a coordinate does not fit the layout.
    pub fn build_hit_id(&self, module: i32, base: i32, film: i32) -> Result<u32> {
        let mut id = Identifier::ZERO;
        for (codec, value) in [(&self.module, module), (&self.base, base), (&self.film, film)] {
            if !codec.pack(value, &mut id) {
                return Err(GeoError::invalid_id(
                    id.raw(),
                    format!("{} = {value} does not fit the hit layout", codec.name()),
                ));
            }
        }
        u32::try_from(id.raw()).map_err(|_| GeoError::internal("hit identifier exceeds 32 bits"))
    }

    pub fn module(&self, hit_id: u32) -> i32 {
        self.module.unpack(Identifier::from_raw(u64::from(hit_id)))
    }

    pub fn base(&self, hit_id: u32) -> i32 {
        self.base.unpack(Identifier::from_raw(u64::from(hit_id)))
    }

    pub fn film(&self, hit_id: u32) -> i32 {
        self.film.unpack(Identifier::from_raw(u64::from(hit_id)))
    }

    /// Offline film identifier of a hit.
    pub fn identifier(&self, hit_id: u32, helper: &EmulsionId) -> Identifier {
        helper.film_id(self.module(hit_id), self.base(hit_id), self.film(hit_id))
    }
}

#[cfg(test)]
mod tests {
    use fgeo_types::IdDictManager;

    use super::*;
    use crate::IdHelperConfig;

    #[test]
    fn layouts_differ_by_version() {
        let legacy = HitIdHelper::for_version(LEGACY_VERSION);
        let current = HitIdHelper::for_version("FASERNU-04");
        assert!(legacy.is_legacy());
        assert!(!current.is_legacy());
        let a = legacy.build_hit_id(21, 34, 1).expect("fits legacy");
        let b = current.build_hit_id(21, 34, 1).expect("fits current");
        assert_ne!(a, b, "case=layout_changes_bits");
        assert!(legacy.build_hit_id(32, 0, 0).is_err());
        assert!(current.build_hit_id(40, 100, 0).is_ok());
        assert!(current.build_hit_id(100, 0, 0).is_err());
    }

    #[test]
    fn hit_round_trip_and_offline_identifier() {
        let manager = IdDictManager::faser_default().expect("built-in dictionaries parse");
        let helper = EmulsionId::from_dictionary(IdHelperConfig::default(), &manager)
            .expect("helper initialises");
        let hits = HitIdHelper::for_helper(&helper);
        let hit = hits.build_hit_id(7, 30, 1).expect("fits");
        assert_eq!((hits.module(hit), hits.base(hit), hits.film(hit)), (7, 30, 1));
        assert_eq!(hits.identifier(hit, &helper), helper.film_id(7, 30, 1));
    }
}
