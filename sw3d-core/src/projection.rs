//! Projection builders and viewport mapping
//!
//! Conventions shared by everything that projects or unprojects:
//! right-handed view space, the camera looks down its local -Z, NDC +Y maps
//! to increasing pixel Y without a flip. The reversed-depth perspective maps
//! the near plane to depth 1 and infinity to 0; the other modes keep the
//! classic [-1, 1] depth range.
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

use crate::matrix::ZERO_EPSILON;

/// Projection mode for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionMode {
    /// Infinite far plane, depth 1 at near and 0 at infinity
    ReversedPerspective,
    Perspective,
    /// `height` is the visible extent along Y in view units
    Orthographic { height: f32 },
}

impl Default for ProjectionMode {
    fn default() -> Self {
        Self::ReversedPerspective
    }
}

/// Pixel rectangle a camera renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `width / height`, or 1 for a zero height
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0 {
            self.width as f32 / self.height as f32
        } else {
            1.0
        }
    }

    /// Map normalized device coordinates to pixels. Z passes through.
    pub fn ndc_to_screen(&self, ndc: &Vector3<f32>) -> Point3<f32> {
        Point3::new(
            (ndc.x + 1.0) * (self.width as f32 * 0.5) + self.x as f32,
            (ndc.y + 1.0) * (self.height as f32 * 0.5) + self.y as f32,
            ndc.z,
        )
    }

    /// Inverse of [`Viewport::ndc_to_screen`]; `None` for an empty viewport
    pub fn screen_to_ndc(&self, screen: &Point3<f32>) -> Option<Vector3<f32>> {
        if self.width == 0 || self.height == 0 {
            return None;
        }

        let x = (screen.x - self.x as f32) / self.width as f32;
        let y = (screen.y - self.y as f32) / self.height as f32;
        Some(Vector3::new(x * 2.0 - 1.0, y * 2.0 - 1.0, screen.z))
    }

    /// Perspective divide plus viewport mapping of a clip-space position.
    ///
    /// A zero `w` (point in the camera plane) cannot be divided; the result is
    /// the sentinel `(0, 0, +inf)` which rasterizers must not plot.
    pub fn clip_to_screen(&self, clip: &Vector4<f32>) -> Point3<f32> {
        if clip.w == 0.0 {
            return Point3::new(0.0, 0.0, f32::INFINITY);
        }

        let inv_w = 1.0 / clip.w;
        self.ndc_to_screen(&(clip.xyz() * inv_w))
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0, 0, 1, 1)
    }
}

/// Reversed-depth perspective with an infinite far plane. Requires `near > 0`.
pub fn perspective_reverse_z(fov_y_degrees: f32, aspect: f32, near: f32) -> Matrix4<f32> {
    debug_assert!(near > 0.0, "reversed-depth projection needs a positive near plane");

    let f1 = 1.0 / (fov_y_degrees * 0.5).to_radians().tan();
    let f2 = f1 / aspect;

    Matrix4::new(
        f2, 0.0, 0.0, 0.0, //
        0.0, f1, 0.0, 0.0, //
        0.0, 0.0, 0.0, near, //
        0.0, 0.0, -1.0, 0.0,
    )
}

/// Classic perspective projection, depth range [-1, 1]
pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
    let y_max = near * (fov_y_degrees * 0.5).to_radians().tan();
    let x_max = y_max * aspect;

    frustum(-x_max, x_max, -y_max, y_max, near, far)
}

pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Matrix4<f32> {
    let x = (2.0 * near) / (right - left);
    let y = (2.0 * near) / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -(far + near) / (far - near);
    let d = -(2.0 * far * near) / (far - near);

    Matrix4::new(
        x, 0.0, a, 0.0, //
        0.0, y, b, 0.0, //
        0.0, 0.0, c, d, //
        0.0, 0.0, -1.0, 0.0,
    )
}

pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Matrix4<f32> {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;

    Matrix4::new(
        2.0 / width, 0.0, 0.0, -(right + left) / width, //
        0.0, 2.0 / height, 0.0, -(top + bottom) / height, //
        0.0, 0.0, -2.0 / depth, -(far + near) / depth, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Placement matrix for an object at `position` facing away from `target`.
///
/// The columns are (left, up, forward, position) with
/// `forward = normalize(position - target)`. `up` is the world direction
/// that should end up at the top of a y-down viewport. When `up` is parallel
/// to the view direction the left axis falls back to -X.
pub fn look_at(position: &Vector3<f32>, target: &Vector3<f32>, up: &Vector3<f32>) -> Matrix4<f32> {
    let forward = (position - target)
        .try_normalize(ZERO_EPSILON)
        .unwrap_or_else(Vector3::z);

    let left = up
        .cross(&-forward)
        .try_normalize(ZERO_EPSILON)
        .unwrap_or_else(|| Vector3::new(-1.0, 0.0, 0.0));

    let up = forward.cross(&left);

    let mut m = Matrix3::from_columns(&[left, up, forward]).to_homogeneous();
    m[(0, 3)] = position.x;
    m[(1, 3)] = position.y;
    m[(2, 3)] = position.z;
    m
}
