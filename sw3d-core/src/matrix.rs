//! Matrix algorithms layered on top of nalgebra's storage types
//!
//! nalgebra provides the column-major `Matrix3`/`Matrix4` storage and the
//! operator surface. The routines here are the ones the pipeline depends on
//! bit-for-bit: the tolerance-gated cofactor inverse, the affine inverse used
//! for view matrices, the double precision adjugate inverse used to undo a
//! projection, and Euler angle extraction.
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

/// Tolerance for comparisons against zero (1/65536)
pub const ZERO_EPSILON: f32 = 1.0 / 65536.0;

/// `|sin(pitch)|` above `1 - GIMBAL_EPSILON` counts as gimbal lock
const GIMBAL_EPSILON: f32 = 1.0e-6;

/// Operations on 3x3 blocks
pub trait Matrix3Ext {
    /// Cofactor determinant accumulated in double precision
    fn determinant_f64(&self) -> f64;

    /// Cofactor inverse. Returns `None` when `|det| < tolerance`.
    fn inverse_with_tolerance(&self, tolerance: f64) -> Option<Matrix3<f32>>;

    /// Best-effort inverse: the matrix itself when it cannot be inverted.
    fn inverse_or_self(&self) -> Matrix3<f32>;

    /// The block with every column normalized, which strips axis scale from
    /// a rotate-then-scale block. `None` if a column is near zero.
    fn without_scale(&self) -> Option<Matrix3<f32>>;

    /// Extract X/Y/Z angles in degrees for `R = Rx * Ry * Rz`.
    ///
    /// The flag is `false` when pitch sits at +-90 degrees. The solution is
    /// not unique there, so Z is pinned to zero and X absorbs the rest.
    fn to_euler_xyz_degrees(&self) -> (Vector3<f32>, bool);
}

impl Matrix3Ext for Matrix3<f32> {
    fn determinant_f64(&self) -> f64 {
        let m = |r: usize, c: usize| f64::from(self[(r, c)]);

        m(0, 0) * (m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1))
            + m(0, 1) * (m(1, 2) * m(2, 0) - m(1, 0) * m(2, 2))
            + m(0, 2) * (m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0))
    }

    fn inverse_with_tolerance(&self, tolerance: f64) -> Option<Matrix3<f32>> {
        let m = |r: usize, c: usize| f64::from(self[(r, c)]);

        // Adjugate (transposed cofactors), row-major
        let adj = [
            [
                m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1),
                m(0, 2) * m(2, 1) - m(0, 1) * m(2, 2),
                m(0, 1) * m(1, 2) - m(0, 2) * m(1, 1),
            ],
            [
                m(1, 2) * m(2, 0) - m(1, 0) * m(2, 2),
                m(0, 0) * m(2, 2) - m(0, 2) * m(2, 0),
                m(0, 2) * m(1, 0) - m(0, 0) * m(1, 2),
            ],
            [
                m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0),
                m(0, 1) * m(2, 0) - m(0, 0) * m(2, 1),
                m(0, 0) * m(1, 1) - m(0, 1) * m(1, 0),
            ],
        ];

        let det = m(0, 0) * adj[0][0] + m(0, 1) * adj[1][0] + m(0, 2) * adj[2][0];
        if det.abs() < tolerance {
            return None;
        }

        let inv_det = 1.0 / det;
        Some(Matrix3::from_fn(|r, c| (adj[r][c] * inv_det) as f32))
    }

    fn inverse_or_self(&self) -> Matrix3<f32> {
        self.inverse_with_tolerance(f64::from(ZERO_EPSILON))
            .unwrap_or(*self)
    }

    fn without_scale(&self) -> Option<Matrix3<f32>> {
        let mut block = *self;
        for mut column in block.column_iter_mut() {
            column.try_normalize_mut(ZERO_EPSILON)?;
        }
        Some(block)
    }

    fn to_euler_xyz_degrees(&self) -> (Vector3<f32>, bool) {
        let sin_pitch = self[(0, 2)].clamp(-1.0, 1.0);
        let pitch = sin_pitch.asin();

        let (x, z, unique) = if sin_pitch >= 1.0 - GIMBAL_EPSILON {
            let angle = self[(1, 0)].atan2(self[(1, 1)]);
            (angle, 0.0, false)
        } else if sin_pitch <= GIMBAL_EPSILON - 1.0 {
            let angle = self[(1, 0)].atan2(self[(1, 1)]);
            (-angle, 0.0, false)
        } else {
            let x = (-self[(1, 2)]).atan2(self[(2, 2)]);
            let z = (-self[(0, 1)]).atan2(self[(0, 0)]);
            (x, z, true)
        };

        (
            Vector3::new(x.to_degrees(), pitch.to_degrees(), z.to_degrees()),
            unique,
        )
    }
}

/// Affine-aware operations on 4x4 matrices
pub trait Matrix4Ext {
    /// Last row is (0, 0, 0, 1) within [`ZERO_EPSILON`]
    fn is_affine(&self) -> bool;

    fn translation(&self) -> Vector3<f32>;

    fn upper_3x3(&self) -> Matrix3<f32>;

    /// Inverse that exploits the affine layout.
    ///
    /// Only meaningful when [`Matrix4Ext::is_affine`] holds. A singular 3x3
    /// block is kept unmodified, so the result is wrong but finite; a warning
    /// is logged. Use [`Matrix4Ext::try_affine_inverse`] to detect it.
    fn affine_inverse(&self) -> Matrix4<f32>;

    /// Like [`Matrix4Ext::affine_inverse`] but `None` on a singular block
    fn try_affine_inverse(&self) -> Option<Matrix4<f32>>;

    /// Adjugate inverse valid for any invertible matrix, projections included.
    /// Accumulated in `f64`, narrowed to `f32`.
    fn general_inverse(&self) -> Option<Matrix4<f32>>;

    /// `self * (p, 1)` without the perspective divide
    fn transform_point_h(&self, point: &Point3<f32>) -> Vector4<f32>;
}

impl Matrix4Ext for Matrix4<f32> {
    fn is_affine(&self) -> bool {
        self[(3, 0)].abs() < ZERO_EPSILON
            && self[(3, 1)].abs() < ZERO_EPSILON
            && self[(3, 2)].abs() < ZERO_EPSILON
            && (self[(3, 3)] - 1.0).abs() <= ZERO_EPSILON
    }

    fn translation(&self) -> Vector3<f32> {
        Vector3::new(self[(0, 3)], self[(1, 3)], self[(2, 3)])
    }

    fn upper_3x3(&self) -> Matrix3<f32> {
        Matrix3::from_fn(|r, c| self[(r, c)])
    }

    fn affine_inverse(&self) -> Matrix4<f32> {
        let block = self.upper_3x3();
        let inverted = block
            .inverse_with_tolerance(f64::from(ZERO_EPSILON))
            .unwrap_or_else(|| {
                log::warn!("affine inverse: singular 3x3 block, keeping it unmodified");
                block
            });

        assemble_affine_inverse(&inverted, &self.translation())
    }

    fn try_affine_inverse(&self) -> Option<Matrix4<f32>> {
        self.upper_3x3()
            .inverse_with_tolerance(f64::from(ZERO_EPSILON))
            .map(|inverted| assemble_affine_inverse(&inverted, &self.translation()))
    }

    fn general_inverse(&self) -> Option<Matrix4<f32>> {
        let a = |r: usize, c: usize| f64::from(self[(r, c)]);

        // 2x2 minors of the top two rows
        let s0 = a(0, 0) * a(1, 1) - a(1, 0) * a(0, 1);
        let s1 = a(0, 0) * a(1, 2) - a(1, 0) * a(0, 2);
        let s2 = a(0, 0) * a(1, 3) - a(1, 0) * a(0, 3);
        let s3 = a(0, 1) * a(1, 2) - a(1, 1) * a(0, 2);
        let s4 = a(0, 1) * a(1, 3) - a(1, 1) * a(0, 3);
        let s5 = a(0, 2) * a(1, 3) - a(1, 2) * a(0, 3);

        // 2x2 minors of the bottom two rows
        let c5 = a(2, 2) * a(3, 3) - a(3, 2) * a(2, 3);
        let c4 = a(2, 1) * a(3, 3) - a(3, 1) * a(2, 3);
        let c3 = a(2, 1) * a(3, 2) - a(3, 1) * a(2, 2);
        let c2 = a(2, 0) * a(3, 3) - a(3, 0) * a(2, 3);
        let c1 = a(2, 0) * a(3, 2) - a(3, 0) * a(2, 2);
        let c0 = a(2, 0) * a(3, 1) - a(3, 0) * a(2, 1);

        let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;

        let adj = [
            [
                a(1, 1) * c5 - a(1, 2) * c4 + a(1, 3) * c3,
                -a(0, 1) * c5 + a(0, 2) * c4 - a(0, 3) * c3,
                a(3, 1) * s5 - a(3, 2) * s4 + a(3, 3) * s3,
                -a(2, 1) * s5 + a(2, 2) * s4 - a(2, 3) * s3,
            ],
            [
                -a(1, 0) * c5 + a(1, 2) * c2 - a(1, 3) * c1,
                a(0, 0) * c5 - a(0, 2) * c2 + a(0, 3) * c1,
                -a(3, 0) * s5 + a(3, 2) * s2 - a(3, 3) * s1,
                a(2, 0) * s5 - a(2, 2) * s2 + a(2, 3) * s1,
            ],
            [
                a(1, 0) * c4 - a(1, 1) * c2 + a(1, 3) * c0,
                -a(0, 0) * c4 + a(0, 1) * c2 - a(0, 3) * c0,
                a(3, 0) * s4 - a(3, 1) * s2 + a(3, 3) * s0,
                -a(2, 0) * s4 + a(2, 1) * s2 - a(2, 3) * s0,
            ],
            [
                -a(1, 0) * c3 + a(1, 1) * c1 - a(1, 2) * c0,
                a(0, 0) * c3 - a(0, 1) * c1 + a(0, 2) * c0,
                -a(3, 0) * s3 + a(3, 1) * s1 - a(3, 2) * s0,
                a(2, 0) * s3 - a(2, 1) * s1 + a(2, 2) * s0,
            ],
        ];

        Some(Matrix4::from_fn(|r, c| (adj[r][c] * inv_det) as f32))
    }

    fn transform_point_h(&self, point: &Point3<f32>) -> Vector4<f32> {
        self * Vector4::new(point.x, point.y, point.z, 1.0)
    }
}

fn assemble_affine_inverse(rotation: &Matrix3<f32>, translation: &Vector3<f32>) -> Matrix4<f32> {
    let t = -(rotation * translation);
    let mut out = rotation.to_homogeneous();
    out[(0, 3)] = t.x;
    out[(1, 3)] = t.y;
    out[(2, 3)] = t.z;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection;
    use crate::transform::Transform;

    fn max_abs_diff(a: &Matrix4<f32>, b: &Matrix4<f32>) -> f32 {
        (a - b).iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    #[test]
    fn test_inverse_3x3_known_matrix() {
        let m = Matrix3::new(2.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 0.5);
        let inv = m.inverse_with_tolerance(f64::from(ZERO_EPSILON)).unwrap();
        assert!((inv[(0, 0)] - 0.5).abs() < 1e-6);
        assert!((inv[(1, 1)] - 0.25).abs() < 1e-6);
        assert!((inv[(2, 2)] - 2.0).abs() < 1e-6);
        assert!(((m * inv) - Matrix3::identity()).norm() < 1e-6);
    }

    #[test]
    fn test_singular_3x3_is_left_unchanged() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 1.0, 1.0);
        assert!(m.inverse_with_tolerance(f64::from(ZERO_EPSILON)).is_none());
        assert_eq!(m.inverse_or_self(), m);
        assert!(m.determinant_f64().abs() < 1e-12);
    }

    #[test]
    fn test_without_scale_recovers_rotation() {
        let rotation = Transform::rotation_3x3(&Vector3::new(20.0, -35.0, 50.0));
        let scaled = rotation * Matrix3::from_diagonal(&Vector3::new(2.0, 0.5, 3.0));
        let stripped = scaled.without_scale().unwrap();
        assert!((stripped - rotation).norm() < 1e-5);
        assert!((stripped.transpose() * stripped - Matrix3::identity()).norm() < 1e-5);

        let flat = Matrix3::from_diagonal(&Vector3::new(1.0, 0.0, 1.0));
        assert!(flat.without_scale().is_none());
    }

    #[test]
    fn test_affine_predicate() {
        let m = Transform::compose(
            &Vector3::new(1.0, 2.0, 3.0),
            &Vector3::new(2.0, 2.0, 2.0),
            &Vector3::new(10.0, 20.0, 30.0),
        );
        assert!(m.is_affine());

        let p = projection::perspective_reverse_z(60.0, 1.5, 0.5);
        assert!(!p.is_affine());
    }

    #[test]
    fn test_affine_and_general_inverse_agree() {
        let m = Transform::compose(
            &Vector3::new(-4.0, 0.5, 12.0),
            &Vector3::new(1.5, 0.75, 3.0),
            &Vector3::new(33.0, -71.0, 128.0),
        );
        let affine = m.affine_inverse();
        let general = m.general_inverse().unwrap();
        assert!(max_abs_diff(&affine, &general) < 1e-5);
        assert!(max_abs_diff(&(m * affine), &Matrix4::identity()) < 1e-5);
    }

    #[test]
    fn test_affine_inverse_of_singular_block() {
        let m = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 0.0, 1.0));
        assert!(m.try_affine_inverse().is_none());
        // Compatibility path keeps the block as is
        assert_eq!(m.affine_inverse().upper_3x3(), m.upper_3x3());
    }

    #[test]
    fn test_general_inverse_of_projection() {
        let p = projection::perspective_reverse_z(75.0, 16.0 / 9.0, 0.1);
        let inv = p.general_inverse().unwrap();
        assert!(max_abs_diff(&(p * inv), &Matrix4::identity()) < 1e-5);
    }

    #[test]
    fn test_general_inverse_matches_nalgebra() {
        let m = Matrix4::new(
            3.0, 1.0, 0.5, 2.0, //
            0.0, 2.0, 1.0, -1.0, //
            1.0, 0.0, 4.0, 0.0, //
            0.5, 1.0, 0.0, 1.0,
        );
        let ours = m.general_inverse().unwrap();
        let reference = m.try_inverse().unwrap();
        assert!(max_abs_diff(&ours, &reference) < 1e-5);
    }

    #[test]
    fn test_general_inverse_singular() {
        let mut m = Matrix4::identity();
        m[(2, 2)] = 0.0;
        assert!(m.general_inverse().is_none());
    }

    #[test]
    fn test_euler_round_trip() {
        let angles = Vector3::new(25.0, -40.0, 110.0);
        let rotation = Transform::rotation_3x3(&angles);
        let (extracted, unique) = rotation.to_euler_xyz_degrees();
        assert!(unique);
        assert!((extracted - angles).norm() < 1e-3);
    }

    #[test]
    fn test_euler_gimbal_lock() {
        let rotation = Transform::rotation_3x3(&Vector3::new(30.0, 90.0, 0.0));
        let (extracted, unique) = rotation.to_euler_xyz_degrees();
        assert!(!unique);
        assert_eq!(extracted.z, 0.0);
        let rebuilt = Transform::rotation_3x3(&extracted);
        assert!((rebuilt - rotation).norm() < 1e-4);
    }
}
