//! Star field flying towards the viewer
//!
//! The field has its own camera, placed so that the `z = 0` plane maps one
//! world unit to one character cell. Stars spawn in a box behind that plane
//! and drift forward; a star is recycled at the back of the box as soon as it
//! leaves the screen or the depth window.
use nalgebra::{Point3, Vector3, Vector4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sw3d_core::{Camera, Mesh, NodeHandle, Scene};

use crate::error::Result;
use crate::renderer::AsciiRenderer;

/// Forward speed in world units per second
const SPEED: f32 = 100.0;

/// Brightness ramp for stars, far to near
const STAR_RAMP: &[char] = &['.', '.', '\'', '+', '*'];

pub struct Starfield {
    camera: NodeHandle,
    mesh: NodeHandle,
    width: u32,
    height: u32,
    field_width: u32,
    field_height: u32,
    depth: u32,
    depth_near: f32,
    depth_far: f32,
    rng: StdRng,
}

impl Starfield {
    pub fn new(scene: &mut Scene, width: u32, height: u32, stars: usize, depth: u32) -> Result<Self> {
        Self::with_rng(scene, width, height, stars, depth, StdRng::from_os_rng())
    }

    pub fn with_rng(
        scene: &mut Scene,
        width: u32,
        height: u32,
        stars: usize,
        depth: u32,
        rng: StdRng,
    ) -> Result<Self> {
        let camera = scene.create_camera(Camera::new(width, height));
        let mesh = scene.create_mesh(Mesh::default());
        if let Some(node) = scene.node_mut(camera) {
            node.set_name("starfield-camera");
        }
        if let Some(node) = scene.node_mut(mesh) {
            node.set_name("starfield");
        }

        let mut field = Self {
            camera,
            mesh,
            width,
            height,
            field_width: ((width as f32 * 1.25) as u32).max(1),
            field_height: ((height as f32 * 1.25) as u32).max(1),
            depth: depth.max(1),
            depth_near: 1.0,
            depth_far: 0.0,
            rng,
        };
        field.place_camera(scene, depth)?;

        let positions = (0..stars)
            .map(|_| {
                let z = -(field.rng.random_range(0..field.depth) as f32);
                field.spawn(z)
            })
            .collect();
        if let Some(mesh) = scene.mesh_mut(field.mesh) {
            mesh.positions = positions;
        }

        log::info!(
            "starfield: {stars} stars, depth {}, field {}x{}",
            field.depth,
            field.field_width,
            field.field_height
        );
        Ok(field)
    }

    /// Back the camera off until the `z = 0` plane spans the viewport height
    fn place_camera(&mut self, scene: &mut Scene, depth: u32) -> Result<()> {
        let camera = scene
            .camera_mut(self.camera)
            .ok_or(sw3d_core::SceneError::NotACamera(self.camera))?;
        let half_fov = (camera.fov() * 0.5).to_radians();
        let distance = (self.height as f32 * 0.5) * half_fov.cos() / half_fov.sin();
        camera.set_viewport_depth(1.0, distance + depth as f32);
        let far = camera.far();

        scene.set_position_z(self.camera, distance)?;
        self.depth = (far.floor() as u32).max(1);

        let mvp = scene.view_projection_matrix(self.camera)? * scene.matrix_world(self.mesh)?;
        let near = mvp * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let far = mvp * Vector4::new(0.0, 0.0, -far, 1.0);
        self.depth_near = near.z / near.w;
        self.depth_far = far.z / far.w;
        Ok(())
    }

    fn spawn(&mut self, z: f32) -> Point3<f32> {
        Point3::new(
            self.rng.random_range(0..self.field_width) as f32 - (self.field_width / 2) as f32,
            self.rng.random_range(0..self.field_height) as f32 - (self.field_height / 2) as f32,
            z,
        )
    }

    pub fn camera(&self) -> NodeHandle {
        self.camera
    }

    /// NDC depth at the `z = 0` plane and at the back of the field
    pub fn depth_window(&self) -> (f32, f32) {
        (self.depth_near, self.depth_far)
    }

    pub fn update(&mut self, scene: &mut Scene, delta_seconds: f32) {
        let step = Vector3::new(0.0, 0.0, SPEED * delta_seconds);
        if let Some(mesh) = scene.mesh_mut(self.mesh) {
            for star in &mut mesh.positions {
                *star += step;
            }
        }
    }

    /// Draw into empty cells and recycle stars that left the visible volume
    pub fn render(&mut self, scene: &mut Scene, renderer: &mut AsciiRenderer) -> Result<()> {
        scene.transform_mesh(self.mesh, self.camera)?;

        let Some(mesh) = scene.mesh(self.mesh) else {
            return Ok(());
        };
        let (near, far) = (self.depth_near, self.depth_far);
        let mut recycle = Vec::new();

        for (index, star) in mesh.transformed().iter().enumerate() {
            let x = (star.x + 0.5).floor();
            let y = (star.y + 0.5).floor();
            let on_screen = x >= 0.0
                && y >= 0.0
                && x < self.width as f32
                && y < self.height as f32
                && star.z >= far
                && star.z <= near;

            if on_screen {
                let t = (star.z - far) / (near - far);
                let ramp = ((t * (STAR_RAMP.len() - 1) as f32).round() as usize)
                    .min(STAR_RAMP.len() - 1);
                renderer.plot_background(x as i64, y as i64, STAR_RAMP[ramp]);
            } else {
                recycle.push(index);
            }
        }

        if recycle.is_empty() {
            return Ok(());
        }
        let back = -(self.depth as f32);
        let fresh: Vec<Point3<f32>> = recycle.iter().map(|_| self.spawn(back)).collect();
        if let Some(mesh) = scene.mesh_mut(self.mesh) {
            for (index, position) in recycle.into_iter().zip(fresh) {
                mesh.positions[index] = position;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(stars: usize) -> (Scene, Starfield) {
        let mut scene = Scene::new();
        let field =
            Starfield::with_rng(&mut scene, 80, 24, stars, 256, StdRng::seed_from_u64(7)).unwrap();
        (scene, field)
    }

    #[test]
    fn test_plane_maps_to_cells() {
        let (mut scene, field) = field(0);
        let corner = scene
            .project(field.camera(), &Point3::new(10.0, 5.0, 0.0))
            .unwrap();
        assert!((corner.x - 50.0).abs() < 1e-2);
        assert!((corner.y - 17.0).abs() < 1e-2);
    }

    #[test]
    fn test_depth_window_is_reversed() {
        let (_, field) = field(0);
        let (near, far) = field.depth_window();
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn test_stars_move_and_recycle() {
        let (mut scene, mut field) = field(50);
        let mesh = scene.find_mesh_by_name("starfield").unwrap();
        assert_eq!(scene.mesh(mesh).unwrap().vertex_count(), 50);

        // Push every star past the z = 0 plane
        field.update(&mut scene, 300.0);
        let mut renderer = AsciiRenderer::new(80, 24);
        field.render(&mut scene, &mut renderer).unwrap();

        let depth = -(field.depth as f32);
        assert!(scene
            .mesh(mesh)
            .unwrap()
            .positions
            .iter()
            .all(|p| p.z == depth));
    }
}
