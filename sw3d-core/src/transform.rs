//! Local transform composition and rotation conversions
//!
//! Rotations are authored as Euler angles in degrees and applied as
//! `Rx * Ry * Rz`, so a vector is rotated around Z first, then Y, then X.
use nalgebra::{Matrix3, Matrix4, UnitQuaternion, Vector3};

use crate::matrix::Matrix3Ext;

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// 3x3 rotation for X/Y/Z angles in degrees
    pub fn rotation_3x3(angles: &Vector3<f32>) -> Matrix3<f32> {
        let (sx, cx) = angles.x.to_radians().sin_cos();
        let (sy, cy) = angles.y.to_radians().sin_cos();
        let (sz, cz) = angles.z.to_radians().sin_cos();

        Matrix3::new(
            cy * cz,
            -cy * sz,
            sy,
            cx * sz + sx * sy * cz,
            cx * cz - sx * sy * sz,
            -sx * cy,
            sx * sz - cx * sy * cz,
            sx * cz + cx * sy * sz,
            cx * cy,
        )
    }

    /// Create a rotation matrix from Euler angles in degrees
    pub fn rotation_matrix(angles: &Vector3<f32>) -> Matrix4<f32> {
        Self::rotation_3x3(angles).to_homogeneous()
    }

    /// Create a translation matrix
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Create a scale matrix
    pub fn scale_matrix(sx: f32, sy: f32, sz: f32) -> Matrix4<f32> {
        Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
    }

    /// Local matrix in the fixed order Scale, Rotate, Translate
    pub fn compose(
        position: &Vector3<f32>,
        scale: &Vector3<f32>,
        angles: &Vector3<f32>,
    ) -> Matrix4<f32> {
        with_translation(
            Self::rotation_3x3(angles) * Matrix3::from_diagonal(scale),
            position,
        )
    }

    /// Same as [`Transform::compose`] with the orientation given as a quaternion
    pub fn compose_with_orientation(
        position: &Vector3<f32>,
        scale: &Vector3<f32>,
        orientation: &UnitQuaternion<f32>,
    ) -> Matrix4<f32> {
        with_translation(
            orientation.to_rotation_matrix().into_inner() * Matrix3::from_diagonal(scale),
            position,
        )
    }

    /// Sprite variant: only the Z angle rotates and depth is not scaled
    pub fn compose_2d(position: &Vector3<f32>, scale: &Vector3<f32>, angle_z: f32) -> Matrix4<f32> {
        Self::compose(
            position,
            &Vector3::new(scale.x, scale.y, 1.0),
            &Vector3::new(0.0, 0.0, angle_z),
        )
    }

    pub fn orientation_from_euler_degrees(angles: &Vector3<f32>) -> UnitQuaternion<f32> {
        UnitQuaternion::from_matrix(&Self::rotation_3x3(angles))
    }

    pub fn euler_degrees_from_orientation(orientation: &UnitQuaternion<f32>) -> Vector3<f32> {
        orientation
            .to_rotation_matrix()
            .into_inner()
            .to_euler_xyz_degrees()
            .0
    }
}

fn with_translation(block: Matrix3<f32>, position: &Vector3<f32>) -> Matrix4<f32> {
    let mut m = block.to_homogeneous();
    m[(0, 3)] = position.x;
    m[(1, 3)] = position.y;
    m[(2, 3)] = position.z;
    m
}
