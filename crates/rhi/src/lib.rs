//! Vulkan layer of the forward renderer, built on `ash`.
//!
//! Every wrapper owns its handle, shares the logical device through
//! `Arc<Device>` and releases itself in an idempotent `clear()` that `Drop`
//! also calls. Nothing here knows about meshes, materials or scenes; the
//! `forward-renderer` crate assembles these pieces into a frame.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod loader;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{ErrorKind, RhiError, RhiResult};

pub use ash::vk;
