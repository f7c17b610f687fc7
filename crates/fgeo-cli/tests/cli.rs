use std::fs;

use fgeo_cli::run;
use serde_json::Value;
use tempfile::tempdir;

fn invoke(args: &[&str]) -> (i32, String, String) {
    let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = run(&args, &mut out, &mut err);
    (
        code,
        String::from_utf8(out).expect("utf8 stdout"),
        String::from_utf8(err).expect("utf8 stderr"),
    )
}

#[test]
fn summary_of_builtin_geometry() {
    let (code, out, err) = invoke(&[]);
    assert_eq!(code, 0, "case=summary stderr={err}");
    let summary: Value = serde_json::from_str(&out).expect("json");
    let detectors = summary["detectors"].as_array().expect("detectors");
    assert_eq!(detectors.len(), 2);
    assert_eq!(detectors[0]["name"], "Emulsion");
    assert_eq!(detectors[0]["elements"], 1540);
    assert_eq!(detectors[1]["name"], "SCT");
    assert_eq!(detectors[1]["elements"], 192);
    assert_eq!(detectors[1]["alignables_per_level"], serde_json::json!([192, 96, 12, 4]));
}

#[test]
fn sct_identifier_listing_is_in_hash_order() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("fgeo.toml");
    fs::write(&config, "[emulsion]\nenabled = false\n").expect("write");
    let (code, out, _) = invoke(&["--config", config.to_str().expect("path"), "--ids", "sct"]);
    assert_eq!(code, 0);
    let ids: Vec<Value> = serde_json::from_str(&out).expect("json");
    assert_eq!(ids.len(), 192);
    for (expected, entry) in ids.iter().enumerate() {
        assert_eq!(entry["hash"], expected, "case=hash_order");
    }
    assert_eq!(ids[0]["fields"], "station 0 layer 0 phi 0 eta -1 side 0");

    let (code, _, err) = invoke(&["--config", config.to_str().expect("path"), "--ids", "emulsion"]);
    assert_eq!(code, 9, "case=disabled_detector_is_config_error");
    assert!(err.contains("disabled"));
}

#[test]
fn element_dump_carries_geometry() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("fgeo.toml");
    fs::write(&config, "[emulsion]\nenabled = false\n[sct]\nalignable = false\n").expect("write");
    let (code, out, _) = invoke(&["--config", config.to_str().expect("path"), "--elements"]);
    assert_eq!(code, 0);
    let elements: Vec<Value> = serde_json::from_str(&out).expect("json");
    assert_eq!(elements.len(), 192);
    let first = &elements[0];
    assert_eq!(first["detector"], "SCT");
    let normal_z = first["normal"][2].as_f64().expect("normal");
    assert!((normal_z.abs() - 1.0).abs() < 1e-9);
    assert!(first["bounds"]["min"][2].as_f64() <= first["center"][2].as_f64());
}

#[test]
fn missing_config_reports_config_error() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let (code, out, err) = invoke(&["--config", missing.to_str().expect("path")]);
    assert_eq!(code, 9);
    assert!(out.is_empty());
    assert!(err.contains("unable to open configuration"));
}

#[test]
fn invalid_log_filter_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("fgeo.toml");
    fs::write(&config, "log_filter = \"fgeo=notalevel\"\n").expect("write");
    let (code, _, err) = invoke(&["--config", config.to_str().expect("path")]);
    assert_eq!(code, 9, "case=bad_filter stderr={err}");
}
