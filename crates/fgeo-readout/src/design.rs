//! Sensor designs: local dimensions and the hit-to-reconstruction frame.
//!
//! The reconstruction frame of every sensor has `x` along phi, `y` along
//! eta and `z` along depth. The simulation (hit) frame may order those axes
//! differently; the design records which hit axis carries each direction.

use fgeo_error::{GeoError, Result};
use fgeo_geomodel::{Point3, Transform3D, Vector3};
use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitAxis {
    X,
    Y,
    Z,
}

impl HitAxis {
    fn unit(self) -> Vector3 {
        match self {
            Self::X => Vector3::new(1.0, 0.0, 0.0),
            Self::Y => Vector3::new(0.0, 1.0, 0.0),
            Self::Z => Vector3::new(0.0, 0.0, 1.0),
        }
    }
}

/// Strip readout along the phi direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StripReadout {
    pub pitch: f64,
    pub strips: u32,
}

impl StripReadout {
    fn active_half_width(&self) -> f64 {
        0.5 * self.pitch * f64::from(self.strips)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorDesign {
    name: String,
    half_width: f64,
    half_length: f64,
    thickness: f64,
    phi_axis: HitAxis,
    eta_axis: HitAxis,
    depth_axis: HitAxis,
    phi_direction: bool,
    eta_direction: bool,
    depth_direction: bool,
    strips: Option<StripReadout>,
}

impl DetectorDesign {
    /// Rectangle of `2 * half_width` (phi) by `2 * half_length` (eta), hit
    /// axes equal to the reconstruction axes.
    pub fn new(name: impl Into<String>, half_width: f64, half_length: f64, thickness: f64) -> Result<Self> {
        if !(half_width > 0.0 && half_length > 0.0 && thickness > 0.0) {
            return Err(GeoError::config(format!(
                "design dimensions must be positive: {half_width} x {half_length} x {thickness}"
            )));
        }
        Ok(Self {
            name: name.into(),
            half_width,
            half_length,
            thickness,
            phi_axis: HitAxis::X,
            eta_axis: HitAxis::Y,
            depth_axis: HitAxis::Z,
            phi_direction: true,
            eta_direction: true,
            depth_direction: true,
            strips: None,
        })
    }

    /// Assign hit-frame axes to phi, eta and depth.
    ///
    /// The resulting change of basis must be a proper rotation.
    pub fn with_hit_axes(mut self, phi: HitAxis, eta: HitAxis, depth: HitAxis) -> Result<Self> {
        self.phi_axis = phi;
        self.eta_axis = eta;
        self.depth_axis = depth;
        self.check_handedness()?;
        Ok(self)
    }

    /// Flip individual directions; `true` keeps the hit axis orientation.
    pub fn with_directions(mut self, phi: bool, eta: bool, depth: bool) -> Result<Self> {
        self.phi_direction = phi;
        self.eta_direction = eta;
        self.depth_direction = depth;
        self.check_handedness()?;
        Ok(self)
    }

    pub fn with_strips(mut self, pitch: f64, strips: u32) -> Result<Self> {
        if pitch <= 0.0 || strips == 0 {
            return Err(GeoError::config(format!(
                "strip readout needs positive pitch and count: {pitch} x {strips}"
            )));
        }
        let readout = StripReadout { pitch, strips };
        if readout.active_half_width() > self.half_width + 1e-9 {
            return Err(GeoError::config(format!(
                "{} strips of pitch {pitch} exceed design width {}",
                strips,
                2.0 * self.half_width
            )));
        }
        self.strips = Some(readout);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn half_width(&self) -> f64 {
        self.half_width
    }

    pub const fn half_length(&self) -> f64 {
        self.half_length
    }

    pub const fn thickness(&self) -> f64 {
        self.thickness
    }

    pub const fn strips(&self) -> Option<StripReadout> {
        self.strips
    }

    fn signed(axis: HitAxis, direction: bool) -> Vector3 {
        if direction { axis.unit() } else { -axis.unit() }
    }

    fn basis(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[
            Self::signed(self.phi_axis, self.phi_direction),
            Self::signed(self.eta_axis, self.eta_direction),
            Self::signed(self.depth_axis, self.depth_direction),
        ])
    }

    fn check_handedness(&self) -> Result<()> {
        let det = self.basis().determinant();
        if (det - 1.0).abs() > 1e-9 {
            return Err(GeoError::config(format!(
                "design {}: hit axes {:?}/{:?}/{:?} do not form a right-handed frame",
                self.name, self.phi_axis, self.eta_axis, self.depth_axis
            )));
        }
        Ok(())
    }

    /// Fixed change of basis taking reconstruction-local coordinates to
    /// hit-local coordinates.
    pub fn reco_to_hit_transform(&self) -> Transform3D {
        let rotation = Rotation3::from_matrix_unchecked(self.basis());
        Transform3D::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_rotation_matrix(&rotation),
        )
    }

    /// Whether a reconstruction-local point lies on the sensor face.
    pub fn contains(&self, local: &Point3) -> bool {
        local.x.abs() <= self.half_width
            && local.y.abs() <= self.half_length
            && local.z.abs() <= 0.5 * self.thickness
    }

    /// The four face corners in the reconstruction frame.
    pub fn corners(&self) -> [Point3; 4] {
        let (w, l) = (self.half_width, self.half_length);
        [
            Point3::new(-w, -l, 0.0),
            Point3::new(w, -l, 0.0),
            Point3::new(w, l, 0.0),
            Point3::new(-w, l, 0.0),
        ]
    }

    /// Strip hit by the local phi coordinate `phi`, if any.
    pub fn strip_of(&self, phi: f64) -> Option<u32> {
        let readout = self.strips?;
        let offset = phi + readout.active_half_width();
        if offset < 0.0 {
            return None;
        }
        let strip = (offset / readout.pitch).floor() as u64;
        u32::try_from(strip).ok().filter(|s| *s < readout.strips)
    }

    /// Local phi coordinate of the centre of `strip`.
    pub fn local_of_strip(&self, strip: u32) -> Option<f64> {
        let readout = self.strips?;
        (strip < readout.strips)
            .then(|| (f64::from(strip) + 0.5).mul_add(readout.pitch, -readout.active_half_width()))
    }
}
