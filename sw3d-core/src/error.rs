//! Error types for the scene graph and mesh import.

use thiserror::Error;

use crate::node::NodeHandle;

/// Failures of scene graph operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The handle is stale or was never issued by this scene
    #[error("node {0:?} does not exist")]
    NodeNotFound(NodeHandle),

    #[error("node {0:?} is not a camera")]
    NotACamera(NodeHandle),

    #[error("node {0:?} is not a mesh")]
    NotAMesh(NodeHandle),

    /// Reparenting would make a node its own ancestor
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    WouldCreateCycle {
        child: NodeHandle,
        parent: NodeHandle,
    },
}

/// Failures while decoding STL data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StlError {
    #[error("file too small to be a valid STL ({0} bytes)")]
    TooSmall(usize),

    #[error("unexpected end of file: {expected} triangles announced, {found} present")]
    Truncated { expected: usize, found: usize },

    #[error("failed to parse ASCII STL: {0}")]
    Ascii(String),

    #[error("ASCII STL is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type alias for scene operations.
pub type Result<T> = std::result::Result<T, SceneError>;
