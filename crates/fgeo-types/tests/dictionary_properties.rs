use fgeo_types::faser::{EMULSION, NEUTRINO, SCT, TRACKER};
use fgeo_types::{ExpandedIdentifier, IdContext, IdDictManager, Identifier};
use proptest::prelude::*;

fn manager() -> IdDictManager {
    IdDictManager::faser_default().expect("built-in dictionaries parse")
}

#[test]
fn film_multi_range_cardinality() {
    let manager = manager();
    let dict = manager.dictionary("Neutrino").expect("present");
    let prefix = ExpandedIdentifier::from_slice(&[NEUTRINO, EMULSION]);
    assert_eq!(dict.build_multi_range(&prefix, 3).cardinality(), 22 * 35);
    assert_eq!(dict.build_multi_range(&prefix, 4).cardinality(), 22 * 35 * 2);
}

#[test]
fn enumeration_order_matches_packed_order() {
    let manager = manager();
    let dict = manager.dictionary("Tracker").expect("present");
    let prefix = ExpandedIdentifier::from_slice(&[TRACKER, SCT]);
    let wafers = dict.build_multi_range(&prefix, 6);
    let packed: Vec<Identifier> = wafers.iter().map(|e| dict.pack(&e)).collect();
    assert_eq!(packed.len(), 4 * 3 * 4 * 2 * 2);
    assert!(
        packed.windows(2).all(|w| w[0] < w[1]),
        "case=lexicographic_order packed identifiers must be strictly increasing"
    );
}

proptest! {
    #[test]
    fn emulsion_pack_round_trip(module in 0..22_i32, base in 0..35_i32, film in 0..2_i32) {
        let manager = manager();
        let dict = manager.dictionary("Neutrino").expect("present");
        let expanded = ExpandedIdentifier::from_slice(&[NEUTRINO, EMULSION, module, base, film]);
        let id = dict.pack(&expanded);
        prop_assert!(id.is_valid());
        let back = dict.unpack(id, IdContext::new(0, 4)).expect("context fits");
        prop_assert_eq!(back, expanded, "case=emulsion_round_trip");
    }

    #[test]
    fn sct_pack_round_trip(
        station in 0..4_i32,
        layer in 0..3_i32,
        phi in 0..4_i32,
        eta in prop::sample::select(vec![-1_i32, 1]),
        side in 0..2_i32,
        strip in 0..768_i32,
    ) {
        let manager = manager();
        let dict = manager.dictionary("Tracker").expect("present");
        let expanded =
            ExpandedIdentifier::from_slice(&[TRACKER, SCT, station, layer, phi, eta, side, strip]);
        let id = dict.pack(&expanded);
        prop_assert!(id.is_valid());
        let back = dict.unpack(id, IdContext::new(0, 7)).expect("context fits");
        prop_assert_eq!(back, expanded, "case=sct_round_trip");
    }

    #[test]
    fn packed_order_is_lexicographic(
        a in prop::collection::vec(0..22_i32, 3),
        b in prop::collection::vec(0..22_i32, 3),
    ) {
        let manager = manager();
        let dict = manager.dictionary("Neutrino").expect("present");
        let clamp = |v: &[i32]| {
            ExpandedIdentifier::from_slice(&[NEUTRINO, EMULSION, v[0], v[1] % 35, v[2] % 2])
        };
        let (ea, eb) = (clamp(&a), clamp(&b));
        prop_assert_eq!(ea.cmp(&eb), dict.pack(&ea).cmp(&dict.pack(&eb)));
    }
}
