//! Camera component and the view / projection pipeline
use nalgebra::{Matrix4, Point3, Vector3, Vector4};

use crate::error::{Result, SceneError};
use crate::matrix::{Matrix3Ext, Matrix4Ext};
use crate::node::{NodeHandle, WorldListener};
use crate::projection::{self, ProjectionMode, Viewport};
use crate::scene::Scene;

/// Camera parameters plus the three derived matrix caches.
///
/// The camera's placement comes from the scene node it is attached to; the
/// view matrix is the inverse of that node's world matrix.
#[derive(Debug, Clone)]
pub struct Camera {
    fov: f32,
    aspect_ratio: f32,
    viewport: Viewport,
    near: f32,
    far: f32,
    mode: ProjectionMode,

    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    view_projection: Matrix4<f32>,

    view_dirty: bool,
    projection_dirty: bool,
    view_projection_dirty: bool,
}

impl Camera {
    /// Camera rendering into a `width` x `height` viewport at the origin
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self::default();
        camera.set_viewport(Viewport::new(0, 0, width, height));
        camera
    }

    /// Vertical field of view in degrees
    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn set_fov(&mut self, fov_degrees: f32) {
        self.fov = fov_degrees;
        self.mark_projection_dirty();
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.mark_projection_dirty();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Also resets the aspect ratio to the viewport's
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.aspect_ratio = viewport.aspect_ratio();
        self.mark_projection_dirty();
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn set_near(&mut self, near: f32) {
        self.near = near;
        self.mark_projection_dirty();
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn set_far(&mut self, far: f32) {
        self.far = far;
        self.mark_projection_dirty();
    }

    pub fn set_viewport_depth(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.mark_projection_dirty();
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        self.mode
    }

    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.mode = mode;
        self.mark_projection_dirty();
    }

    pub fn mark_view_dirty(&mut self) {
        self.view_dirty = true;
        self.view_projection_dirty = true;
    }

    pub fn mark_projection_dirty(&mut self) {
        self.projection_dirty = true;
        self.view_projection_dirty = true;
    }

    pub fn is_view_dirty(&self) -> bool {
        self.view_dirty
    }

    pub fn is_projection_dirty(&self) -> bool {
        self.projection_dirty
    }

    pub fn is_view_projection_dirty(&self) -> bool {
        self.view_projection_dirty
    }

    pub fn projection_matrix(&mut self) -> Matrix4<f32> {
        if self.projection_dirty {
            self.projection = self.build_projection();
            self.projection_dirty = false;
            log::trace!("rebuilt {:?} projection", self.mode);
        }
        self.projection
    }

    fn build_projection(&self) -> Matrix4<f32> {
        match self.mode {
            ProjectionMode::ReversedPerspective => {
                projection::perspective_reverse_z(self.fov, self.aspect_ratio, self.near)
            }
            ProjectionMode::Perspective => {
                projection::perspective(self.fov, self.aspect_ratio, self.near, self.far)
            }
            ProjectionMode::Orthographic { height } => {
                let half_height = height * 0.5;
                let half_width = half_height * self.aspect_ratio;
                projection::orthographic(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 45.0,
            aspect_ratio: 4.0 / 3.0,
            viewport: Viewport::default(),
            near: 1.0,
            far: 65535.0,
            mode: ProjectionMode::default(),
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            view_projection: Matrix4::identity(),
            view_dirty: true,
            projection_dirty: true,
            view_projection_dirty: true,
        }
    }
}

impl WorldListener for Camera {
    fn on_world_recomposed(&mut self) {
        self.mark_view_dirty();
    }
}

impl Scene {
    fn camera_component(&mut self, handle: NodeHandle) -> Result<&mut Camera> {
        self.get(handle)?;
        self.cameras
            .get_mut(handle)
            .ok_or(SceneError::NotACamera(handle))
    }

    /// Inverse of the camera node's world matrix
    pub fn view_matrix(&mut self, camera: NodeHandle) -> Result<Matrix4<f32>> {
        let stale = self.is_dirty_world(camera)?;
        if !stale && !self.camera_component(camera)?.view_dirty {
            return Ok(self.camera_component(camera)?.view);
        }

        let world = self.matrix_world(camera)?;
        let component = self.camera_component(camera)?;
        component.view = world.affine_inverse();
        component.view_dirty = false;
        component.view_projection_dirty = true;
        Ok(component.view)
    }

    pub fn projection_matrix(&mut self, camera: NodeHandle) -> Result<Matrix4<f32>> {
        Ok(self.camera_component(camera)?.projection_matrix())
    }

    /// `projection * view`
    pub fn view_projection_matrix(&mut self, camera: NodeHandle) -> Result<Matrix4<f32>> {
        let stale = self.is_dirty_world(camera)?;
        let component = self.camera_component(camera)?;
        if !stale
            && !component.view_dirty
            && !component.projection_dirty
            && !component.view_projection_dirty
        {
            return Ok(component.view_projection);
        }

        let view = self.view_matrix(camera)?;
        let component = self.camera_component(camera)?;
        component.view_projection = component.projection_matrix() * view;
        component.view_projection_dirty = false;
        Ok(component.view_projection)
    }

    /// Turn the camera so its -Z axis points at `target`.
    ///
    /// The orientation is written through the rotation field, expressed in
    /// the frame of the camera's parent.
    pub fn look_at(
        &mut self,
        camera: NodeHandle,
        target: &Vector3<f32>,
        up: &Vector3<f32>,
    ) -> Result<()> {
        self.camera_component(camera)?;

        let position = self.matrix_world(camera)?.translation();
        let mut basis = projection::look_at(&position, target, up).upper_3x3();

        if let Some(parent) = self.parent(camera)? {
            let parent_block = self.matrix_world(parent)?.upper_3x3();
            basis = match parent_block.without_scale() {
                Some(rotation) => rotation.transpose() * basis,
                None => {
                    log::warn!("parent of {camera:?} has a degenerate axis, look_at is approximate");
                    parent_block.inverse_or_self() * basis
                }
            };
        }

        let (angles, unique) = basis.to_euler_xyz_degrees();
        if !unique {
            log::debug!("look_at on {camera:?} hit gimbal lock, Z angle pinned to 0");
        }
        self.set_rotation(camera, angles)
    }

    /// World point to viewport pixels. `z` holds the NDC depth.
    ///
    /// A point in the camera plane yields `(0, 0, +inf)`; check
    /// `z.is_finite()` before plotting.
    pub fn project(&mut self, camera: NodeHandle, world: &Point3<f32>) -> Result<Point3<f32>> {
        let view_projection = self.view_projection_matrix(camera)?;
        let clip = view_projection.transform_point_h(world);
        Ok(self.camera_component(camera)?.viewport.clip_to_screen(&clip))
    }

    /// Viewport pixels plus NDC depth back to a world point.
    ///
    /// `None` when the view-projection is singular, the viewport is empty or
    /// the point maps to infinity.
    pub fn unproject(
        &mut self,
        camera: NodeHandle,
        screen: &Point3<f32>,
    ) -> Result<Option<Point3<f32>>> {
        let view_projection = self.view_projection_matrix(camera)?;
        let viewport = self.camera_component(camera)?.viewport;

        let Some(inverse) = view_projection.general_inverse() else {
            log::warn!("view-projection of {camera:?} is singular, cannot unproject");
            return Ok(None);
        };
        let Some(ndc) = viewport.screen_to_ndc(screen) else {
            return Ok(None);
        };

        let world = inverse * Vector4::new(ndc.x, ndc.y, ndc.z, 1.0);
        if world.w == 0.0 {
            return Ok(None);
        }
        Ok(Some(Point3::from(world.xyz() / world.w)))
    }
}
