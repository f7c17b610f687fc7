//! The single rigid-transform representation used throughout the geometry.

use nalgebra::{Isometry3, Translation3, UnitQuaternion};

pub type Transform3D = Isometry3<f64>;
pub type Point3 = nalgebra::Point3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;

pub fn identity() -> Transform3D {
    Transform3D::identity()
}

pub fn translation(x: f64, y: f64, z: f64) -> Transform3D {
    Transform3D::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
}

/// Rotation about x, then y, then z (fixed axes).
pub fn rotation_xyz(rx: f64, ry: f64, rz: f64) -> Transform3D {
    let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rz)
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), ry)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), rx);
    Transform3D::from_parts(Translation3::identity(), rotation)
}

/// Alignment constants `(tx, ty, tz, rx, ry, rz)` as a transform:
/// the rotation is applied first, then the translation.
pub fn from_alignment_parameters(parameters: [f64; 6]) -> Transform3D {
    let [tx, ty, tz, rx, ry, rz] = parameters;
    translation(tx, ty, tz) * rotation_xyz(rx, ry, rz)
}

/// Whether every entry of the two homogeneous matrices differs by at most `tol`.
pub fn approx_eq(a: &Transform3D, b: &Transform3D, tol: f64) -> bool {
    let (ma, mb) = (a.to_homogeneous(), b.to_homogeneous());
    ma.iter().zip(mb.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

pub fn is_identity(t: &Transform3D, tol: f64) -> bool {
    approx_eq(t, &Transform3D::identity(), tol)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn rotation_order_is_x_then_y_then_z() {
        let t = rotation_xyz(FRAC_PI_2, 0.0, FRAC_PI_2);
        // x rotation takes +y to +z; z rotation leaves +z alone.
        let v = t * Vector3::new(0.0, 1.0, 0.0);
        assert!((v - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
        // +x is untouched by the x rotation and goes to +y under z.
        let w = t * Vector3::new(1.0, 0.0, 0.0);
        assert!((w - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn alignment_parameters_rotate_then_translate() {
        let t = from_alignment_parameters([1.0, 2.0, 3.0, 0.0, 0.0, FRAC_PI_2]);
        let p = t * Point3::new(1.0, 0.0, 0.0);
        assert!((p - Point3::new(1.0, 3.0, 3.0)).norm() < 1e-12);
    }

    #[test]
    fn approx_equality() {
        let a = translation(1.0, 0.0, 0.0);
        let b = translation(1.0 + 1e-10, 0.0, 0.0);
        assert!(approx_eq(&a, &b, 1e-9));
        assert!(!approx_eq(&a, &identity(), 1e-9));
        assert!(is_identity(&(a * a.inverse()), 1e-12));
    }
}
