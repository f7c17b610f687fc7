//! Geometry parameters read from the parameter tables.
//!
//! All lengths are millimetres and all angles radians. Table widths (`DX`,
//! `DY`, `DZ`) are full lengths; the structs below keep half lengths where
//! the volume tree wants them.

use fgeo_error::{GeoError, Result};
use fgeo_geomodel::transform::{self, Transform3D};
use fgeo_geomodel::{RdbAccess, RecordSet};
use serde::Serialize;
use tracing::debug;

/// One slab of the emulsion stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlabSpec {
    pub half_x: f64,
    pub half_y: f64,
    pub thickness: f64,
    pub material: String,
}

impl SlabSpec {
    fn read(set: &RecordSet) -> Result<Self> {
        Ok(Self {
            half_x: set.double(0, "DX")? / 2.0,
            half_y: set.double(0, "DY")? / 2.0,
            thickness: set.double(0, "DZ")?,
            material: set.string(0, "MAT")?.to_owned(),
        })
    }
}

/// Passive support structure, placed directly in the detector envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportSpec {
    pub name: String,
    pub half: [f64; 3],
    pub position: [f64; 3],
    pub material: String,
}

/// Version switches shared by both detectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Switches {
    pub detector_name: String,
    pub version_name: String,
    pub layout: String,
}

impl Switches {
    fn read(set: &RecordSet) -> Result<Self> {
        Ok(Self {
            detector_name: set.string(0, "DETECTORNAME")?.to_owned(),
            version_name: set.string(0, "VERSIONNAME")?.to_owned(),
            layout: set.string(0, "LAYOUT")?.to_owned(),
        })
    }
}

fn count(set: &RecordSet, column: &str) -> Result<i32> {
    let value = set.int(0, column)?;
    i32::try_from(value)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| GeoError::config(format!("{column} must be a positive count, got {value}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmulsionGeoParameters {
    pub modules: i32,
    pub bases_per_module: i32,
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub film: SlabSpec,
    pub base: SlabSpec,
    pub plate: SlabSpec,
    pub supports: Vec<SupportSpec>,
    pub switches: Switches,
}

impl EmulsionGeoParameters {
    pub fn read(rdb: &dyn RdbAccess, tag: &str) -> Result<Self> {
        let general = rdb.recordset("EmulsionGeneral", tag)?;
        let supports = rdb.recordset("EmulsionSupport", tag)?;
        let supports = supports
            .iter()
            .map(|row| {
                let t = supports.table.as_str();
                Ok(SupportSpec {
                    name: row.get_string(t, "NAME")?.to_owned(),
                    half: [
                        row.get_double(t, "DX")? / 2.0,
                        row.get_double(t, "DY")? / 2.0,
                        row.get_double(t, "DZ")? / 2.0,
                    ],
                    position: [
                        row.get_double(t, "X")?,
                        row.get_double(t, "Y")?,
                        row.get_double(t, "Z")?,
                    ],
                    material: row.get_string(t, "MAT")?.to_owned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let parameters = Self {
            modules: count(&general, "NMODULES")?,
            bases_per_module: count(&general, "NBASEPERMODULE")?,
            position: [
                general.double(0, "POSX")?,
                general.double(0, "POSY")?,
                general.double(0, "POSZ")?,
            ],
            rotation: [
                general.double(0, "ROTX")?,
                general.double(0, "ROTY")?,
                general.double(0, "ROTZ")?,
            ],
            film: SlabSpec::read(&*rdb.recordset("EmulsionFilm", tag)?)?,
            base: SlabSpec::read(&*rdb.recordset("EmulsionBase", tag)?)?,
            plate: SlabSpec::read(&*rdb.recordset("EmulsionPlates", tag)?)?,
            supports,
            switches: Switches::read(&*rdb.recordset("EmulsionSwitches", tag)?)?,
        };
        debug!(
            target: "fgeo.geometry::parameters",
            tag,
            modules = parameters.modules,
            bases = parameters.bases_per_module,
            "emulsion parameters read"
        );
        Ok(parameters)
    }

    /// Placement of the detector envelope in the world.
    pub fn placement(&self) -> Transform3D {
        let [x, y, z] = self.position;
        let [rx, ry, rz] = self.rotation;
        transform::translation(x, y, z) * transform::rotation_xyz(rx, ry, rz)
    }

    /// Film, plastic base, film: the thickness of one base volume.
    pub fn base_thickness(&self) -> f64 {
        2.0f64.mul_add(self.film.thickness, self.base.thickness)
    }

    /// Distance between consecutive bases, a tungsten plate included.
    pub fn base_pitch(&self) -> f64 {
        self.base_thickness() + self.plate.thickness
    }

    pub fn module_thickness(&self) -> f64 {
        f64::from(self.bases_per_module) * self.base_pitch()
    }

    /// Z of film `film` inside its base volume.
    pub fn film_z(&self, film: i32) -> f64 {
        let offset = (self.base.thickness + self.film.thickness) / 2.0;
        if film == 0 { -offset } else { offset }
    }

    /// Z of base `base` inside its module.
    pub fn base_z(&self, base: i32) -> f64 {
        let first = -self.module_thickness() / 2.0 + self.base_thickness() / 2.0;
        f64::from(base).mul_add(self.base_pitch(), first)
    }

    /// Z of module `module` inside the envelope.
    pub fn module_z(&self, module: i32) -> f64 {
        let centre = f64::from(self.modules - 1) / 2.0;
        (f64::from(module) - centre) * self.module_thickness()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SctGeoParameters {
    pub stations: i32,
    pub layers: i32,
    pub phi_modules: i32,
    pub eta_modules: i32,
    pub first_station_z: f64,
    pub station_pitch: f64,
    pub layer_pitch: f64,
    pub phi_pitch: f64,
    pub eta_pitch: f64,
    pub side_gap: f64,
    pub wafer_width: f64,
    pub wafer_length: f64,
    pub wafer_thickness: f64,
    pub stereo_angle: f64,
    pub strips: u32,
    pub strip_pitch: f64,
    pub material: String,
    pub switches: Switches,
}

impl SctGeoParameters {
    pub fn read(rdb: &dyn RdbAccess, tag: &str) -> Result<Self> {
        let general = rdb.recordset("SctGeneral", tag)?;
        let module = rdb.recordset("SctModule", tag)?;
        let strips = count(&module, "NSTRIPS")?;
        let parameters = Self {
            stations: count(&general, "NSTATIONS")?,
            layers: count(&general, "NLAYERS")?,
            phi_modules: count(&general, "NPHI")?,
            eta_modules: count(&general, "NETA")?,
            first_station_z: general.double(0, "FIRSTSTATIONZ")?,
            station_pitch: general.double(0, "STATIONPITCH")?,
            layer_pitch: general.double(0, "LAYERPITCH")?,
            phi_pitch: general.double(0, "PHIPITCH")?,
            eta_pitch: general.double(0, "ETAPITCH")?,
            side_gap: general.double(0, "SIDEGAP")?,
            wafer_width: module.double(0, "WIDTH")?,
            wafer_length: module.double(0, "LENGTH")?,
            wafer_thickness: module.double(0, "THICKNESS")?,
            stereo_angle: module.double(0, "STEREOANGLE")?,
            strips: strips.unsigned_abs(),
            strip_pitch: module.double(0, "PITCH")?,
            material: module.string(0, "MAT")?.to_owned(),
            switches: Switches::read(&*rdb.recordset("SctSwitches", tag)?)?,
        };
        debug!(
            target: "fgeo.geometry::parameters",
            tag,
            stations = parameters.stations,
            layers = parameters.layers,
            "sct parameters read"
        );
        Ok(parameters)
    }

    pub fn station_z(&self, station: i32) -> f64 {
        f64::from(station).mul_add(self.station_pitch, self.first_station_z)
    }

    /// Z of `layer` inside its station; layers are centred on the station.
    pub fn layer_z(&self, layer: i32) -> f64 {
        let centre = f64::from(self.layers - 1) / 2.0;
        (f64::from(layer) - centre) * self.layer_pitch
    }

    /// Phi rows are stacked along global y.
    pub fn phi_y(&self, phi: i32) -> f64 {
        let centre = f64::from(self.phi_modules - 1) / 2.0;
        (f64::from(phi) - centre) * self.phi_pitch
    }

    /// Eta field values, symmetric around zero and skipping zero:
    /// two modules give -1 and 1.
    pub fn eta_values(&self) -> Vec<i32> {
        (0..self.eta_modules)
            .map(|i| 2 * i - (self.eta_modules - 1))
            .collect()
    }

    /// X of the module centre for eta field value `eta`.
    pub fn eta_x(&self, eta: i32) -> f64 {
        f64::from(eta) * self.eta_pitch / 2.0
    }

    /// Signed z of wafer `side` inside its module.
    pub fn side_z(&self, side: i32) -> f64 {
        let offset = (self.side_gap + self.wafer_thickness) / 2.0;
        if side == 0 { -offset } else { offset }
    }

    /// Signed stereo rotation of wafer `side` about the module normal.
    pub fn side_stereo(&self, side: i32) -> f64 {
        let half = self.stereo_angle / 2.0;
        if side == 0 { -half } else { half }
    }

    pub fn module_half_thickness(&self) -> f64 {
        self.side_gap / 2.0 + self.wafer_thickness
    }
}

#[cfg(test)]
mod tests {
    use fgeo_geomodel::InMemoryRdb;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn builtin_emulsion_parameters() {
        let rdb = InMemoryRdb::faser_default().expect("tables");
        let p = EmulsionGeoParameters::read(&rdb, "FASERNU-04").expect("read");
        assert_eq!(p.modules, 22);
        assert_eq!(p.bases_per_module, 35);
        assert_eq!(p.supports.len(), 2);
        assert!((p.base_thickness() - 0.35).abs() < 1e-12);
        assert!((p.base_pitch() - 1.45).abs() < 1e-12);
        assert!((p.film_z(1) + p.film_z(0)).abs() < 1e-12, "case=films_symmetric");
        // First and last bases sit symmetrically in the module.
        assert!((p.base_z(0) + p.base_z(34)).abs() < 1e-9);
        assert!((p.module_z(0) + p.module_z(21)).abs() < 1e-9);
        assert_eq!(p.switches.version_name, "FASERNU-04");
    }

    #[test]
    fn builtin_sct_parameters() {
        let rdb = InMemoryRdb::faser_default().expect("tables");
        let p = SctGeoParameters::read(&rdb, "FASER-01").expect("read");
        assert_eq!(p.stations, 4);
        assert_eq!(p.eta_values(), vec![-1, 1]);
        assert_eq!(p.strips, 768);
        assert!((p.station_z(3) - 3600.0).abs() < 1e-12);
        assert!((p.layer_z(0) + 50.0).abs() < 1e-12);
        assert!((p.phi_y(0) + p.phi_y(3)).abs() < 1e-12);
        assert!(p.side_z(0) < 0.0 && p.side_z(1) > 0.0);
    }

    #[test]
    fn unknown_tag_reads_untagged_tables_but_not_switches() {
        let rdb = InMemoryRdb::faser_default().expect("tables");
        let err = SctGeoParameters::read(&rdb, "FASER-99").expect_err("switches are tagged");
        assert!(matches!(err, GeoError::NoSuchTable { ref table, .. } if table == "SctSwitches"));
    }

    #[test]
    fn non_positive_counts_are_rejected() {
        let text = r#"
[[tables]]
name = "SctGeneral"
rows = [ { NSTATIONS = 0 } ]
"#;
        let rdb = InMemoryRdb::from_toml_str(text).expect("tables");
        let general = rdb.recordset("SctGeneral", "any").expect("table");
        assert!(matches!(
            count(&general, "NSTATIONS"),
            Err(GeoError::InvalidConfig { .. })
        ));
    }

    proptest! {
        #[test]
        fn stacked_volumes_are_evenly_spaced(base in 0i32..34, module in 0i32..21) {
            let rdb = InMemoryRdb::faser_default().expect("tables");
            let p = EmulsionGeoParameters::read(&rdb, "FASERNU-04").expect("read");
            let base_step = p.base_z(base + 1) - p.base_z(base);
            let module_step = p.module_z(module + 1) - p.module_z(module);
            prop_assert!((base_step - p.base_pitch()).abs() < 1e-9, "case=base_pitch");
            prop_assert!((module_step - p.module_thickness()).abs() < 1e-9, "case=module_pitch");
            prop_assert!(p.base_z(base).abs() <= p.module_thickness() / 2.0);
        }
    }
}
