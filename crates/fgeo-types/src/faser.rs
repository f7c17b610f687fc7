//! FASER subdetector numbering and the built-in dictionaries.

use crate::{IdDictionary, Identifier};

/// Built-in dictionary set (`Neutrino` and `Tracker`).
pub const FASER_DICTIONARIES: &str = include_str!("../data/faser_dictionaries.toml");

pub const NEUTRINO: i32 = 1;
pub const SCINTILLATOR: i32 = 2;
pub const TRACKER: i32 = 3;
pub const CALORIMETER: i32 = 4;

/// `part` value of the emulsion detector inside `Neutrino`.
pub const EMULSION: i32 = 1;
/// `part` value of the silicon strip tracker inside `Tracker`.
pub const SCT: i32 = 1;

pub const NEUTRINO_DICTIONARY: &str = "Neutrino";
pub const TRACKER_DICTIONARY: &str = "Tracker";

/// The `(subdet, part)` prefix shared by all identifiers of one technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetectorTechnology {
    pub subdet: i32,
    pub part: i32,
}

impl DetectorTechnology {
    pub const EMULSION: Self = Self::new(NEUTRINO, EMULSION);
    pub const SCT: Self = Self::new(TRACKER, SCT);

    pub const fn new(subdet: i32, part: i32) -> Self {
        Self { subdet, part }
    }

    /// Whether `id` carries this technology's prefix under `dictionary`'s
    /// layout. The first two fields must be `subdet` and `part`.
    pub fn owns(&self, dictionary: &IdDictionary, id: Identifier) -> bool {
        if !id.is_valid() {
            return false;
        }
        match (dictionary.codec(0), dictionary.codec(1)) {
            (Some(subdet), Some(part)) => {
                subdet.unpack(id) == self.subdet && part.unpack(id) == self.part
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExpandedIdentifier, IdDictManager};

    #[test]
    fn builtin_dictionaries_parse() {
        let manager = IdDictManager::faser_default().expect("built-in dictionaries parse");
        let neutrino = manager
            .dictionary(NEUTRINO_DICTIONARY)
            .expect("neutrino dictionary present");
        assert_eq!(neutrino.version(), "FASERNU-04");
        assert_eq!(neutrino.label_value("subdet", "Neutrino"), Some(NEUTRINO));
        assert_eq!(neutrino.label_value("part", "Emulsion"), Some(EMULSION));

        let tracker = manager
            .dictionary(TRACKER_DICTIONARY)
            .expect("tracker dictionary present");
        assert_eq!(tracker.label_value("subdet", "Tracker"), Some(TRACKER));
        let eta = tracker.codec(5).expect("eta codec");
        assert!(eta.is_enumerated(), "case=eta_enumerated");
        assert_eq!(manager.tag(), "FASER-01");
    }

    #[test]
    fn shared_prefix_fields_use_the_same_bits() {
        let manager = IdDictManager::faser_default().expect("built-in dictionaries parse");
        let neutrino = manager.dictionary(NEUTRINO_DICTIONARY).expect("present");
        let tracker = manager.dictionary(TRACKER_DICTIONARY).expect("present");
        for i in 0..2 {
            let a = neutrino.codec(i).expect("codec");
            let b = tracker.codec(i).expect("codec");
            assert_eq!((a.bits(), a.shift(), a.offset()), (b.bits(), b.shift(), b.offset()));
        }
    }

    #[test]
    fn technology_ownership() {
        let manager = IdDictManager::faser_default().expect("built-in dictionaries parse");
        let neutrino = manager.dictionary(NEUTRINO_DICTIONARY).expect("present");
        let tracker = manager.dictionary(TRACKER_DICTIONARY).expect("present");

        let film = neutrino.pack(&ExpandedIdentifier::from_slice(&[NEUTRINO, EMULSION, 3, 4, 1]));
        assert!(DetectorTechnology::EMULSION.owns(neutrino, film));
        assert!(!DetectorTechnology::SCT.owns(tracker, film));
        assert!(!DetectorTechnology::EMULSION.owns(neutrino, Identifier::INVALID));

        let wafer = tracker.pack(&ExpandedIdentifier::from_slice(&[TRACKER, SCT, 1, 2, 3, -1, 0]));
        assert!(DetectorTechnology::SCT.owns(tracker, wafer));
        assert!(!DetectorTechnology::EMULSION.owns(neutrino, wafer));
    }
}
