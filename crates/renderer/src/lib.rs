//! Frame lifecycle core of the forward renderer.
//!
//! This crate ties the RHI objects together:
//! - Static geometry upload
//! - Per-frame instance and uniform buffers
//! - The forward pass and its depth target
//! - Frame orchestration (acquire, record, submit, present)

pub mod batch;
pub mod depth_buffer;
pub mod forward_pass;
pub mod geometry;
pub mod orchestrator;
pub mod renderer;
pub mod uniforms;

pub use batch::{DrawBatch, InstanceBatches};
pub use forward_pass::ForwardPass;
pub use geometry::{MeshRecord, StaticGeometryStore};
pub use orchestrator::{FrameOrchestrator, FrameState, FrameStatus, PresentTarget};
pub use renderer::Renderer;
pub use uniforms::DynamicBufferSet;
