#![warn(missing_docs)]

//! Math types for cadlink.
//!
//! Thin wrappers around nalgebra providing the homogeneous transforms used to
//! move between part mesh frames, mate frames and body-local frames, plus the
//! inertia tensor re-expression helpers.

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector4};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = nalgebra::Vector3<f64>;

/// A 3x3 matrix (rotation blocks, inertia tensors).
pub type Mat3 = Matrix3<f64>;

/// A 4x4 homogeneous transformation matrix.
///
/// Transforms are expected to be rigid (orthonormal rotation block plus a
/// translation). Nothing here re-orthonormalizes an input matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(1, 1)] = c;
        m[(1, 2)] = -s;
        m[(2, 1)] = s;
        m[(2, 2)] = c;
        Self { matrix: m }
    }

    /// Rotation about the Y axis by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(0, 0)] = c;
        m[(0, 2)] = s;
        m[(2, 0)] = -s;
        m[(2, 2)] = c;
        Self { matrix: m }
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(0, 0)] = c;
        m[(0, 1)] = -s;
        m[(1, 0)] = s;
        m[(1, 1)] = c;
        Self { matrix: m }
    }

    /// Frame with the given axes as rotation columns and `origin` as translation.
    ///
    /// This is the "part to frame" matrix of a coordinate system authored in
    /// part coordinates: it maps frame-local coordinates into part coordinates.
    pub fn from_axes(x_axis: &Vec3, y_axis: &Vec3, z_axis: &Vec3, origin: &Vec3) -> Self {
        let mut m = Matrix4::identity();
        for row in 0..3 {
            m[(row, 0)] = x_axis[row];
            m[(row, 1)] = y_axis[row];
            m[(row, 2)] = z_axis[row];
            m[(row, 3)] = origin[row];
        }
        Self { matrix: m }
    }

    /// Build from 16 values in row-major order (the CAD API layout).
    pub fn from_row_major(values: &[f64; 16]) -> Self {
        Self {
            matrix: Matrix4::from_row_slice(values),
        }
    }

    /// The 16 matrix values in row-major order.
    pub fn to_row_major(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[row * 4 + col] = self.matrix[(row, col)];
            }
        }
        out
    }

    /// Compose: `self` then `other` (self * other).
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// The upper-left 3x3 rotation block.
    pub fn rotation(&self) -> Mat3 {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// The translation column.
    pub fn translation_part(&self) -> Vec3 {
        Vec3::new(self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)])
    }

    /// Fixed-axis roll/pitch/yaw of the rotation block, in radians.
    ///
    /// Matches the robot-description convention: `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn rpy(&self) -> Vec3 {
        let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(self.rotation()).euler_angles();
        Vec3::new(roll, pitch, yaw)
    }

    /// Entry-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &Transform, eps: f64) -> bool {
        self.matrix
            .iter()
            .zip(other.matrix.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }

    /// True when this is the identity within `eps`.
    pub fn is_identity(&self, eps: f64) -> bool {
        self.approx_eq(&Self::identity(), eps)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Re-express an inertia tensor in a rotated frame: `R * I * R^T`.
pub fn rotate_inertia(rotation: &Mat3, inertia: &Mat3) -> Mat3 {
    rotation * inertia * rotation.transpose()
}

/// Parallel-axis theorem.
///
/// Moves an inertia tensor taken about the center of mass to a point displaced
/// by `offset` from it: `I + m * (|d|^2 * E - d * d^T)`.
pub fn parallel_axis(inertia_about_com: &Mat3, mass: f64, offset: &Vec3) -> Mat3 {
    let d2 = offset.norm_squared();
    inertia_about_com + (Mat3::identity() * d2 - offset * offset.transpose()) * mass
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = Point3::new(1.0, 2.0, 3.0);
        let result = t.apply_point(&p);
        assert!((result - p).norm() < 1e-12);
    }

    #[test]
    fn test_translation() {
        let t = Transform::translation(10.0, 20.0, 30.0);
        let p = Point3::new(1.0, 2.0, 3.0);
        let result = t.apply_point(&p);
        assert!((result.x - 11.0).abs() < 1e-12);
        assert!((result.y - 22.0).abs() < 1e-12);
        assert!((result.z - 33.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_z_90() {
        let t = Transform::rotation_z(PI / 2.0);
        let p = Point3::new(1.0, 0.0, 0.0);
        let result = t.apply_point(&p);
        assert!(result.x.abs() < 1e-12);
        assert!((result.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let t1 = Transform::translation(1.0, 0.0, 0.0);
        let t2 = Transform::rotation_z(PI / 2.0);
        // (t2 * t1) * p = t2 * (t1 * p): translate, then rotate.
        let result = t2.then(&t1).apply_point(&Point3::origin());
        assert!(result.x.abs() < 1e-12);
        assert!((result.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let t = Transform::rotation_x(0.3)
            .then(&Transform::rotation_y(-1.1))
            .then(&Transform::rotation_z(2.4))
            .then(&Transform::translation(0.5, -0.25, 3.0));
        let inv = t.inverse().unwrap();
        assert!(t.then(&inv).is_identity(1e-9));
        assert!(inv.then(&t).is_identity(1e-9));
    }

    #[test]
    fn test_from_axes_columns() {
        let t = Transform::from_axes(
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 0.0, -1.0),
            &Vec3::new(0.0, 1.0, 0.0),
            &Vec3::new(0.0, -0.0505, 0.0),
        );
        // Frame Z maps to part +Y.
        let z = t.apply_vec(&Vec3::z());
        assert_relative_eq!(z, Vec3::y(), epsilon = 1e-12);
        assert_relative_eq!(t.translation_part(), Vec3::new(0.0, -0.0505, 0.0));
        let r = t.rotation();
        assert_relative_eq!(r * r.transpose(), Mat3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_row_major_roundtrip_layout() {
        let values = [
            1.0, 0.0, 0.0, 0.1, //
            0.0, 1.0, 0.0, 0.2, //
            0.0, 0.0, 1.0, 0.3, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let t = Transform::from_row_major(&values);
        assert_relative_eq!(t.translation_part(), Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(t.to_row_major(), values);
    }

    #[test]
    fn test_rpy_matches_fixed_axis_convention() {
        let (roll, pitch, yaw) = (0.2, -0.4, 1.3);
        let t = Transform::rotation_z(yaw)
            .then(&Transform::rotation_y(pitch))
            .then(&Transform::rotation_x(roll));
        let rpy = t.rpy();
        assert_relative_eq!(rpy, Vec3::new(roll, pitch, yaw), epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_inertia_swaps_axes() {
        let inertia = Mat3::from_diagonal(&Vec3::new(1.0, 2.0, 3.0));
        let r = Transform::rotation_z(PI / 2.0).rotation();
        let rotated = rotate_inertia(&r, &inertia);
        assert_relative_eq!(rotated[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[(1, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[(2, 2)], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_axis_point_mass() {
        let shifted = parallel_axis(&Mat3::zeros(), 2.0, &Vec3::new(0.0, 0.0, 0.5));
        assert_relative_eq!(shifted[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(shifted[(1, 1)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(shifted[(2, 2)], 0.0, epsilon = 1e-12);
    }
}
