//! Asset collaborator interface and GPU data layouts.
//!
//! This crate defines what the renderer reads from loaded assets:
//! - Mesh vertex streams and indices
//! - Materials and their texture-array slots
//! - std140 uniform block layouts

pub mod assets;
pub mod error;
pub mod material;
pub mod mesh;
pub mod uniform;

pub use assets::{AssetSet, Assets};
pub use error::{ResourceError, ResourceResult};
pub use material::{Material, MaterialIndexTable, NO_TEXTURE, TextureKind};
pub use mesh::{Mesh, MeshData};
pub use uniform::{LightBlock, LightBlockHeader, SceneBlock};
