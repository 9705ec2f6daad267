//! Vertex buffers and the per-frame screen-space transform stage
use std::collections::{HashMap, HashSet};

use nalgebra::{Matrix4, Point3, Vector2, Vector3};

use crate::error::{Result, SceneError};
use crate::matrix::{Matrix4Ext, ZERO_EPSILON};
use crate::node::NodeHandle;
use crate::projection::Viewport;
use crate::scene::Scene;

/// Undirected edge between two vertex indices, stored with `a < b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub a: u32,
    pub b: u32,
}

impl Edge {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// Loose triangle as produced by importers, before vertices are shared
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Point3<f32>; 3],
}

impl Triangle {
    pub fn new(v0: Point3<f32>, v1: Point3<f32>, v2: Point3<f32>) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Counter-clockwise face normal, `None` for a degenerate triangle
    pub fn face_normal(&self) -> Option<Vector3<f32>> {
        let [v0, v1, v2] = self.vertices;
        (v1 - v0).cross(&(v2 - v0)).try_normalize(ZERO_EPSILON * ZERO_EPSILON)
    }
}

/// Indexed triangle mesh.
///
/// `positions` is the model-space buffer. `transformed` is rebuilt from it by
/// every [`Mesh::transform`] call and holds viewport pixels with the NDC depth
/// in `z`; a vertex in the camera plane gets `z = +inf`. Normals, texture
/// coordinates and colors are carried for the rasterizer only.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub tex_coords: Vec<Vector2<f32>>,
    /// Packed 0xAARRGGBB per vertex
    pub colors: Vec<u32>,
    /// Triangle list, three indices per face
    pub indices: Vec<u32>,
    pub edges: Vec<Edge>,
    transformed: Vec<Point3<f32>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point cloud without faces
    pub fn from_points(points: Vec<Point3<f32>>) -> Self {
        Self {
            positions: points,
            ..Self::default()
        }
    }

    /// Build an indexed mesh, sharing vertices whose positions are bit-identical.
    ///
    /// Vertex normals are the normalized sum of the adjacent face normals.
    pub fn from_triangles(triangles: &[Triangle]) -> Self {
        let mut mesh = Self::new();
        let mut lookup: HashMap<[u32; 3], u32> = HashMap::new();

        for triangle in triangles {
            let normal = triangle.face_normal().unwrap_or_else(Vector3::zeros);
            for vertex in &triangle.vertices {
                let key = [vertex.x.to_bits(), vertex.y.to_bits(), vertex.z.to_bits()];
                let index = *lookup.entry(key).or_insert_with(|| {
                    mesh.positions.push(*vertex);
                    mesh.normals.push(Vector3::zeros());
                    (mesh.positions.len() - 1) as u32
                });
                mesh.normals[index as usize] += normal;
                mesh.indices.push(index);
            }
        }

        for normal in &mut mesh.normals {
            *normal = normal.try_normalize(ZERO_EPSILON).unwrap_or_else(Vector3::zeros);
        }
        mesh.edges = build_edges_from_indices(&mesh.indices);
        log::debug!(
            "welded {} triangles into {} vertices, {} edges",
            triangles.len(),
            mesh.positions.len(),
            mesh.edges.len()
        );
        mesh
    }

    /// Axis aligned cube centred on the origin
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Point3::new(-h, -h, -h),
            Point3::new(h, -h, -h),
            Point3::new(h, h, -h),
            Point3::new(-h, h, -h),
            Point3::new(-h, -h, h),
            Point3::new(h, -h, h),
            Point3::new(h, h, h),
            Point3::new(-h, h, h),
        ];
        let normals = positions
            .iter()
            .map(|p| p.coords.normalize())
            .collect();

        #[rustfmt::skip]
        let indices = vec![
            4, 5, 6, 4, 6, 7, // +z
            1, 0, 3, 1, 3, 2, // -z
            5, 1, 2, 5, 2, 6, // +x
            0, 4, 7, 0, 7, 3, // -x
            7, 6, 2, 7, 2, 3, // +y
            0, 1, 5, 0, 5, 4, // -y
        ];

        let edges = [
            (0, 1), (1, 2), (2, 3), (3, 0),
            (4, 5), (5, 6), (6, 7), (7, 4),
            (0, 4), (1, 5), (2, 6), (3, 7),
        ]
        .into_iter()
        .map(|(a, b)| Edge::new(a, b))
        .collect();

        Self {
            positions,
            normals,
            indices,
            edges,
            ..Self::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Index triples of every complete face
    pub fn faces(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|face| [face[0], face[1], face[2]])
    }

    /// Model-space triangle for a face, `None` if an index is out of range
    pub fn triangle(&self, face: [u32; 3]) -> Option<Triangle> {
        Some(Triangle::new(
            *self.positions.get(face[0] as usize)?,
            *self.positions.get(face[1] as usize)?,
            *self.positions.get(face[2] as usize)?,
        ))
    }

    /// Screen-space buffer from the last [`Mesh::transform`]
    pub fn transformed(&self) -> &[Point3<f32>] {
        &self.transformed
    }

    /// Model-space min and max corners
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        }))
    }

    /// Run every position through `mvp` and into `viewport` pixels
    pub fn transform(&mut self, mvp: &Matrix4<f32>, viewport: &Viewport) {
        self.transformed.resize(self.positions.len(), Point3::origin());
        for (out, position) in self.transformed.iter_mut().zip(&self.positions) {
            *out = viewport.clip_to_screen(&mvp.transform_point_h(position));
        }
    }
}

/// Unique undirected edges of a triangle list, in first-seen order
pub fn build_edges_from_indices(indices: &[u32]) -> Vec<Edge> {
    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    for face in indices.chunks_exact(3) {
        for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
            let edge = Edge::new(a, b);
            if a != b && seen.insert(edge) {
                edges.push(edge);
            }
        }
    }
    edges
}

impl Scene {
    /// Refresh the screen-space buffer of a mesh node as seen by `camera`
    pub fn transform_mesh(&mut self, mesh: NodeHandle, camera: NodeHandle) -> Result<()> {
        if self.mesh(mesh).is_none() {
            self.get(mesh)?;
            return Err(SceneError::NotAMesh(mesh));
        }

        let view_projection = self.view_projection_matrix(camera)?;
        let world = self.matrix_world(mesh)?;
        let viewport = self
            .camera(camera)
            .map(|c| c.viewport())
            .ok_or(SceneError::NotACamera(camera))?;

        let mvp = view_projection * world;
        self.mesh_mut(mesh)
            .ok_or(SceneError::NotAMesh(mesh))?
            .transform(&mvp, &viewport);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;

    #[test]
    fn test_cube_counts() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.edges.len(), 12);
        let (lo, hi) = cube.bounds().unwrap();
        assert_eq!(lo, Point3::new(-1.0, -1.0, -1.0));
        assert_eq!(hi, Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_cube_faces_point_outwards() {
        let cube = Mesh::cube(2.0);
        for face in cube.faces() {
            let triangle = cube.triangle(face).unwrap();
            let centre = (triangle.vertices[0].coords
                + triangle.vertices[1].coords
                + triangle.vertices[2].coords)
                / 3.0;
            assert!(triangle.face_normal().unwrap().dot(&centre) > 0.0);
        }
    }

    #[test]
    fn test_from_triangles_welds_shared_vertices() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(1.0, 1.0, 0.0);
        let d = Point3::new(0.0, 1.0, 0.0);
        let mesh = Mesh::from_triangles(&[Triangle::new(a, b, c), Triangle::new(a, c, d)]);

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.edges.len(), 5);
        assert!((mesh.normals[0] - Vector3::z()).norm() < 1e-6);
    }

    #[test]
    fn test_degenerate_triangle_has_no_normal() {
        let p = Point3::new(1.0, 1.0, 1.0);
        assert!(Triangle::new(p, p, p).face_normal().is_none());
    }

    #[test]
    fn test_transform_resizes_and_marks_camera_plane() {
        let mut mesh = Mesh::from_points(vec![
            Point3::new(0.0, 0.0, -10.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        let mut camera = Camera::new(100, 100);
        camera.set_fov(90.0);
        let mvp = camera.projection_matrix();

        mesh.transform(&mvp, &camera.viewport());
        let out = mesh.transformed();
        assert_eq!(out.len(), 2);
        assert!((out[0] - Point3::new(50.0, 50.0, 0.1)).norm() < 1e-4);
        assert_eq!(out[1].z, f32::INFINITY);

        mesh.positions.truncate(1);
        mesh.transform(&mvp, &camera.viewport());
        assert_eq!(mesh.transformed().len(), 1);
    }

    #[test]
    fn test_scene_transform_mesh_uses_world_matrix() {
        let mut scene = Scene::new();
        let camera = scene.create_camera(Camera::new(100, 100));
        scene.camera_mut(camera).unwrap().set_fov(90.0);
        let mesh = scene.create_mesh(Mesh::from_points(vec![Point3::origin()]));
        scene.set_position(mesh, Vector3::new(0.0, 0.0, -10.0)).unwrap();

        scene.transform_mesh(mesh, camera).unwrap();
        let screen = scene.mesh(mesh).unwrap().transformed()[0];
        let expected = scene.project(camera, &Point3::new(0.0, 0.0, -10.0)).unwrap();
        assert!((screen - expected).norm() < 1e-5);
    }

    #[test]
    fn test_transform_mesh_rejects_wrong_kinds() {
        let mut scene = Scene::new();
        let camera = scene.create_camera(Camera::default());
        let plain = scene.create_node();
        let mesh = scene.create_mesh(Mesh::cube(1.0));

        assert_eq!(
            scene.transform_mesh(plain, camera),
            Err(SceneError::NotAMesh(plain))
        );
        assert_eq!(
            scene.transform_mesh(mesh, plain),
            Err(SceneError::NotACamera(plain))
        );
    }
}
