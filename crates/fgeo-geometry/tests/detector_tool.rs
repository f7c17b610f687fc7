use std::fs;

use fgeo_error::GeoError;
use fgeo_geomodel::{Point3, Vector3, transform};
use fgeo_geometry::{DetectorTool, GeoConfig, GeoModelContext};
use fgeo_readout::{AlignableTransformContainer, GlobalAlignmentContainer, InMemoryConditions};
use tempfile::tempdir;

const BUILTIN: &str = include_str!("../../fgeo-geomodel/data/faser_parameters.toml");

fn small_tables() -> String {
    BUILTIN
        .replace("NMODULES = 22", "NMODULES = 2")
        .replace("NBASEPERMODULE = 35", "NBASEPERMODULE = 4")
}

fn build(config_text: &str) -> GeoModelContext {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("tables.toml"), small_tables()).expect("write tables");
    let config_path = dir.path().join("fgeo.toml");
    fs::write(
        &config_path,
        format!("parameters_path = \"tables.toml\"\n{config_text}"),
    )
    .expect("write config");
    let config = GeoConfig::load(&config_path).expect("config");
    DetectorTool::new(config).create().expect("geometry")
}

#[test]
fn default_build_creates_both_detectors() {
    let context = build("");
    let emulsion = context.emulsion.as_ref().expect("emulsion");
    let sct = context.sct.as_ref().expect("sct");
    assert_eq!(emulsion.elements().count(), 16, "case=emulsion_films");
    assert_eq!(sct.elements().count(), 192, "case=sct_wafers");
    assert_eq!(context.managers().count(), 2);
    assert!(context.tree.find_by_name("Emulsion").is_some());
    assert!(context.tree.find_by_name("Tracker").is_some());
    assert_eq!(context.emulsion_helper.as_ref().expect("helper").film_hash_max(), 1540);
}

#[test]
fn disabled_detectors_are_skipped() {
    let context = build("[emulsion]\nenabled = false\n");
    assert!(context.emulsion.is_none());
    assert!(context.emulsion_helper.is_none());
    assert!(context.sct.is_some());
}

#[test]
fn static_folders_align_both_detectors() {
    let context = build("");
    let emulsion = context.emulsion_helper.as_ref().expect("helper");
    let sct = context.sct_helper.as_ref().expect("helper");

    let mut conditions = InMemoryConditions::new();
    conditions.insert_transforms(
        "/Neutrino/Align/Modules",
        AlignableTransformContainer::new("nu").with(emulsion.module_id(1), transform::translation(0.0, 0.5, 0.0)),
    );
    conditions.insert_transforms(
        "/Neutrino/Align/Bases",
        AlignableTransformContainer::new("nu").with(emulsion.base_id(0, 0), transform::identity()),
    );
    for (key, id) in [
        ("/Tracker/Align/Stations", sct.station_id(0)),
        ("/Tracker/Align/Layers", sct.layer_id(0, 0)),
        ("/Tracker/Align/Modules", sct.module_id(0, 0, 0, 1)),
    ] {
        conditions.insert_transforms(key, AlignableTransformContainer::new("sct").with(id, transform::identity()));
    }
    assert!(context.align(&conditions).expect("align"));

    let shifted = context
        .emulsion
        .as_ref()
        .and_then(|m| m.element_by_id(emulsion.film_id(1, 3, 1)))
        .expect("film");
    let nominal = shifted.def_transform().expect("default") * Point3::origin();
    let offset = shifted.center().expect("center") - nominal;
    assert!((offset - Vector3::new(0.0, 0.5, 0.0)).norm() < 1e-9);

    conditions.remove("/Tracker/Align/Layers");
    assert!(matches!(
        context.align(&conditions),
        Err(GeoError::MissingAlignment { ref key }) if key == "/Tracker/Align/Layers"
    ));
}

#[test]
fn dynamic_global_folder_moves_one_station() {
    let context = build("[alignment]\nuse_dynamic_alignment_folders = true\n");
    let sct = context.sct.as_ref().expect("sct");
    let helper = context.sct_helper.as_ref().expect("helper");
    let mut global = GlobalAlignmentContainer::new();
    global.insert(2, [0.0, 0.0, 1.5, 0.0, 0.0, 0.0]);
    let mut conditions = InMemoryConditions::new();
    conditions.insert_global("/Tracker/AlignL1/Stations", global);
    sct.align_keys(&["/Tracker/AlignL1/Stations"], &conditions, None)
        .expect("align");

    for station in 0..4 {
        let element = sct
            .element_by_id(helper.wafer_id(station, 1, 0, 1, 1))
            .expect("wafer");
        let dz = element.center().expect("center").z - element.def_transform().expect("default").translation.vector.z;
        let expected = if station == 2 { 1.5 } else { 0.0 };
        assert!((dz - expected).abs() < 1e-9, "case=station_shift station={station}");
    }
}

#[test]
fn fixed_geometry_rejects_alignment() {
    let context = build("[sct]\nalignable = false\n");
    let sct = context.sct.as_ref().expect("sct");
    assert!(sct.folder_keys().is_empty());
    assert!(matches!(
        sct.align_keys(&["/Tracker/Align/Stations"], &InMemoryConditions::new(), None),
        Err(GeoError::UnknownFolder { .. })
    ));
}

#[test]
fn missing_parameter_file_is_reported() {
    let dir = tempdir().expect("tempdir");
    let config = GeoConfig {
        parameters_path: Some(dir.path().join("absent.toml")),
        ..GeoConfig::default()
    };
    assert!(matches!(
        DetectorTool::new(config).create(),
        Err(GeoError::CannotOpen { .. })
    ));
}
