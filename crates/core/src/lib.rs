//! Host-facing utilities shared by the renderer crates: configuration
//! loading and validation, the configuration error type, and `tracing`
//! subscriber setup.

mod config;
mod error;
mod logging;

pub use config::{LightCapacity, RendererConfig, ShaderPaths, VsyncPreference};
pub use error::{Error, Result};
pub use logging::init_logging;
