//! Scene collaborator interface.
//!
//! This crate defines what the renderer reads from a scene:
//! - Camera parameters
//! - Light records
//! - Mesh instances

pub mod camera;
pub mod instance;
pub mod light;
pub mod scene;

pub use camera::CameraParams;
pub use instance::{Instance, MaterialId, MeshId};
pub use light::{DirectionalLight, PointLight, SpotLight};
pub use scene::{Scene, SceneData};
