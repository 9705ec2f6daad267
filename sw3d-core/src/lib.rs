//! SW3D Core Library - scene graph and software projection pipeline
//!
//! Nodes live in a [`Scene`] and carry a local transform (position, scale,
//! Euler rotation in degrees). World matrices are composed lazily and cached
//! behind dirty flags that every mutation pushes down the subtree. Camera
//! nodes derive view, projection and view-projection matrices from that
//! hierarchy and map points between world space and viewport pixels.
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use sw3d_core::{Camera, Mesh, Scene};
//!
//! let mut scene = Scene::new();
//! let camera = scene.create_camera(Camera::new(100, 100));
//! let cube = scene.create_mesh(Mesh::cube(1.0));
//! scene.set_position(cube, Vector3::new(0.0, 0.0, -10.0)).unwrap();
//!
//! let centre = scene.project(camera, &Point3::new(0.0, 0.0, -10.0)).unwrap();
//! assert!((centre.x - 50.0).abs() < 1e-3);
//! scene.transform_mesh(cube, camera).unwrap();
//! ```

pub mod camera;
pub mod error;
pub mod matrix;
pub mod mesh;
pub mod node;
pub mod projection;
pub mod scene;
pub mod stl;
pub mod transform;

// Re-export commonly used types
pub use camera::Camera;
pub use error::{Result, SceneError, StlError};
pub use matrix::{Matrix3Ext, Matrix4Ext};
pub use mesh::{Edge, Mesh, Triangle};
pub use node::{NodeHandle, NodeKind, SceneNode, WorldListener};
pub use projection::{ProjectionMode, Viewport};
pub use scene::Scene;
pub use transform::Transform;
