//! Error types for asset validation.

use thiserror::Error;

/// Error type for asset validation.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A mesh has no position data.
    #[error("Mesh {0} has no position data")]
    NoPositionData(u32),

    /// An index refers past the end of the position stream.
    #[error("Mesh {mesh}: index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        /// Mesh identifier.
        mesh: u32,
        /// Offending index value.
        index: u32,
        /// Number of positions in the mesh.
        vertex_count: usize,
    },

    /// Two meshes share one identifier.
    #[error("Duplicate mesh id {0}")]
    DuplicateMesh(u32),

    /// Two materials share one identifier.
    #[error("Duplicate material id {0}")]
    DuplicateMaterial(u32),

    /// A uniform block destination is smaller than the block.
    #[error("Uniform block needs {needed} bytes, {available} available")]
    BlockTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes provided.
        available: usize,
    },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
