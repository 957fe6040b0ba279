//! Integration tests against a real Vulkan device.
//!
//! Every test shares one headless device and runs serially. Tests return
//! early when no Vulkan driver is present.

#[macro_use]
mod gpu_test_utils;

use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec2, Vec3};
use serial_test::serial;

use forward_core::LightCapacity;
use forward_renderer::depth_buffer::DepthBuffer;
use forward_renderer::geometry::{StaticGeometryStore, UploadHandoff};
use forward_renderer::orchestrator::{FrameOrchestrator, FrameState, FrameStatus, PresentTarget};
use forward_renderer::uniforms::DynamicBufferSet;
use forward_resources::uniform::SceneBlock;
use forward_resources::{AssetSet, Material, Mesh};
use forward_rhi::device::Device;
use forward_rhi::physical_device::QueueRole;
use forward_rhi::sync::SyncSet;
use forward_rhi::{RhiError, RhiResult};
use forward_rhi::vertex::{InstanceAttributes, Vertex};
use forward_scene::PointLight;

fn quad(id: u32) -> Mesh {
    Mesh::new(
        id,
        vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ],
        vec![0, 1, 2, 2, 3, 0],
    )
    .with_normals(vec![Vec3::Z; 4])
}

fn triangle(id: u32) -> Mesh {
    Mesh::new(
        id,
        vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        vec![0, 1, 2],
    )
    .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::Y])
}

/// Presentation stand-in driven by empty queue submissions.
///
/// Acquire hands out images round-robin and signals the semaphore from the
/// render queue; present consumes the wait semaphore the same way.
struct HeadlessTarget {
    device: Arc<Device>,
    image_count: u32,
    next: Cell<u32>,
}

impl HeadlessTarget {
    fn new(device: Arc<Device>, image_count: u32) -> Self {
        Self {
            device,
            image_count,
            next: Cell::new(0),
        }
    }
}

impl PresentTarget for HeadlessTarget {
    fn acquire_next_image(&self, semaphore: vk::Semaphore, _timeout: u64) -> RhiResult<(u32, bool)> {
        let signal = [semaphore];
        let submit = vk::SubmitInfo::default().signal_semaphores(&signal);
        unsafe {
            self.device
                .submit(QueueRole::Render, &[submit], vk::Fence::null())?
        };

        let index = self.next.get();
        self.next.set((index + 1) % self.image_count);
        Ok((index, false))
    }

    fn present(&self, _queue: vk::Queue, _image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<bool> {
        let wait = [wait_semaphore];
        let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&stages);
        unsafe {
            self.device
                .submit(QueueRole::Render, &[submit], vk::Fence::null())?
        };
        Ok(false)
    }
}

// ============================================================================
// STATIC GEOMETRY
// ============================================================================

#[test]
#[serial]
fn test_geometry_upload_layout() {
    let device = require_gpu!();
    let assets = AssetSet::new(vec![quad(1), triangle(2)], vec![Material::new(0)]);

    let mut store = StaticGeometryStore::new(device, &assets).expect("upload should succeed");

    assert_eq!(store.counts().vertices, 7);
    assert_eq!(store.counts().indices, 9);
    assert_eq!(store.index_offset(), 7 * Vertex::STRIDE as u64);

    let buffer = store.buffer().expect("non-empty store has a buffer");
    assert!(buffer.size() >= store.counts().buffer_size());

    let records = store.records();
    assert_eq!(records[1].first_index, 6);
    assert_eq!(records[1].vertex_offset, 4);

    store.clear();
    store.clear();
    assert!(store.buffer().is_none());
}

#[test]
#[serial]
fn test_geometry_handoff_matches_queue_families() {
    let device = require_gpu!();
    let transfer = device.queue_family(QueueRole::Transfer);
    let render = device.queue_family(QueueRole::Render);
    let assets = AssetSet::new(vec![quad(1)], Vec::new());

    let store = StaticGeometryStore::new(device, &assets).expect("upload should succeed");

    let handoff = store.handoff().expect("non-empty store was uploaded");
    if transfer == render {
        assert_eq!(handoff, UploadHandoff::Shared);
    } else {
        // Released on the transfer family, acquired on the render family
        assert_eq!(
            handoff,
            UploadHandoff::Transfer {
                from: transfer,
                to: render
            }
        );
    }
    assert!(store.buffer().is_some());
}

#[test]
#[serial]
fn test_empty_assets_build_empty_store() {
    let device = require_gpu!();
    let assets = AssetSet::new(Vec::new(), Vec::new());

    let store = StaticGeometryStore::new(device, &assets).expect("empty upload should succeed");

    assert!(store.buffer().is_none());
    assert!(store.records().is_empty());
}

#[test]
#[serial]
fn test_invalid_assets_are_rejected() {
    let device = require_gpu!();
    let broken = Mesh::new(3, vec![Vec3::ZERO], vec![0, 5, 0]);
    let assets = AssetSet::new(vec![broken], Vec::new());

    assert!(StaticGeometryStore::new(device, &assets).is_err());
}

// ============================================================================
// DYNAMIC BUFFERS
// ============================================================================

#[test]
#[serial]
fn test_update_mappings_points_into_frame_region() {
    let device = require_gpu!();
    let lights = LightCapacity::default();
    let mut set = DynamicBufferSet::new(device, 8, &lights, 3).expect("dynamic set");

    let per_frame = set.layout().per_frame_size as usize;
    let base = set.update_mappings(0).expect("frame 0").as_ptr() as usize;

    for frame in 1..3 {
        let ptr = set.update_mappings(frame).expect("frame").as_ptr() as usize;
        assert_eq!(ptr, base + frame * per_frame);
        assert_eq!(set.current_frame(), frame);
    }

    assert!(set.update_mappings(3).is_err());
    for frame in 0..3 {
        assert!(set.descriptor_set(frame).is_some());
    }
}

#[test]
#[serial]
fn test_dynamic_writes_and_truncation() {
    let device = require_gpu!();
    let lights = LightCapacity {
        directional: 1,
        point: 2,
        spot: 1,
    };
    let mut set = DynamicBufferSet::new(device, 2, &lights, 2).expect("dynamic set");
    set.update_mappings(1).expect("frame 1");

    let instances = vec![InstanceAttributes::new([-1; 3], &Mat4::IDENTITY); 3];
    assert_eq!(set.write_instances(&instances).expect("instances"), 2);

    let block = SceneBlock::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, Vec3::splat(0.1));
    set.write_scene(&block).expect("scene block");

    let points = vec![PointLight::new(Vec3::ZERO, 5.0, Vec3::ONE, 1.0); 4];
    set.write_lights(&[], &points, &[]).expect("lights");
    set.flush_current().expect("flush");

    // The point block header holds the truncated count
    let ptr = set.write_ptr().expect("mapped");
    let region = set.layout().block(forward_renderer::uniforms::UniformBlock::PointLights);
    let count = unsafe { ptr.add(region.offset as usize).cast::<u32>().read_unaligned() };
    assert_eq!(count, 2);
}

#[test]
#[serial]
fn test_light_blocks_are_rewritten_in_place() {
    let device = require_gpu!();
    let mut set = DynamicBufferSet::new(device, 1, &LightCapacity::default(), 1).expect("dynamic set");
    set.update_mappings(0).expect("frame 0");
    let region = set.layout().block(forward_renderer::uniforms::UniformBlock::PointLights);
    let ptr = set.write_ptr().expect("mapped");
    let count = || unsafe { ptr.add(region.offset as usize).cast::<u32>().read_unaligned() };

    let points = vec![PointLight::new(Vec3::ZERO, 5.0, Vec3::ONE, 1.0); 3];
    set.write_lights(&[], &points, &[]).expect("three lights");
    assert_eq!(count(), 3);

    set.write_lights(&[], &points[..1], &[]).expect("one light");
    assert_eq!(count(), 1);
}

#[test]
#[serial]
fn test_dynamic_clear_is_idempotent() {
    let device = require_gpu!();
    let mut set = DynamicBufferSet::new(device, 1, &LightCapacity::default(), 2).expect("dynamic set");

    set.clear();
    set.clear();

    assert!(set.write_ptr().is_none());
    assert!(set.update_mappings(0).is_err());
}

// ============================================================================
// DEPTH TARGET
// ============================================================================

#[test]
#[serial]
fn test_depth_buffer_lifecycle() {
    let device = require_gpu!();
    let extent = vk::Extent2D {
        width: 64,
        height: 48,
    };

    let format = device.depth_format();
    let mut depth = DepthBuffer::new(device, extent).expect("depth buffer");
    assert_eq!(depth.extent(), extent);
    assert_eq!(depth.format(), format);
    assert_ne!(depth.image_view(), vk::ImageView::null());

    depth.clear();
    depth.clear();
    assert_eq!(depth.image(), vk::Image::null());
}

#[test]
#[serial]
fn test_zero_sized_depth_buffer_is_rejected() {
    let device = require_gpu!();
    let extent = vk::Extent2D {
        width: 0,
        height: 48,
    };

    assert!(DepthBuffer::new(device, extent).is_err());
}

// ============================================================================
// SYNCHRONIZATION AND ORCHESTRATION
// ============================================================================

#[test]
#[serial]
fn test_first_frame_fence_does_not_block() {
    let device = require_gpu!();
    let sync = SyncSet::new(device, 2).expect("sync set");

    // Created signaled: a zero timeout succeeds
    assert!(sync.frame(0).in_flight_fence().is_signaled());
    sync.wait_and_reset(0, 0).expect("first wait must not block");
    assert!(!sync.frame(0).in_flight_fence().is_signaled());

    // Now unsignaled: nothing will signal it, so a zero timeout expires
    let result = sync.frame(0).in_flight_fence().wait(0);
    assert!(matches!(
        result,
        Err(RhiError::VulkanError(vk::Result::TIMEOUT))
    ));
}

#[test]
#[serial]
fn test_reset_fence_waits_for_its_submission() {
    let device = require_gpu!();
    let sync = SyncSet::new(device.clone(), 2).expect("sync set");

    sync.wait_and_reset(1, 0).expect("first wait must not block");
    let fence = sync.frame(1).in_flight_fence();
    assert!(!fence.is_signaled());

    let submit = vk::SubmitInfo::default();
    unsafe {
        device
            .submit(QueueRole::Render, &[submit], fence.handle())
            .expect("empty submission")
    };

    // Blocks until the queue retires the submission, then reads signaled
    fence.wait(u64::MAX).expect("submission completes");
    assert!(fence.is_signaled());

    sync.wait_and_reset(1, u64::MAX).expect("signaled fence resets");
    assert!(!fence.is_signaled());
}

#[test]
#[serial]
fn test_orchestrator_runs_headless_frames() {
    let device = require_gpu!();
    let target = HeadlessTarget::new(device.clone(), 3);
    let mut orchestrator =
        FrameOrchestrator::new(device.clone(), 3, 2, u64::MAX).expect("orchestrator");

    for frame in 0..5u64 {
        assert_eq!(orchestrator.virtual_frame(), (frame % 2) as usize);

        let acquired = orchestrator
            .acquire(&target)
            .expect("acquire")
            .expect("headless target is never out of date");
        assert_eq!(orchestrator.state(), FrameState::Recording);
        assert_eq!(acquired.image_index, (frame % 3) as u32);
        assert_eq!(acquired.frame_index, (frame % 2) as usize);

        let mut encoded = false;
        orchestrator
            .record_with(&acquired, |_| {
                encoded = true;
                Ok(())
            })
            .expect("record");
        assert!(encoded);

        orchestrator.submit(&acquired).expect("submit");
        assert_eq!(orchestrator.state(), FrameState::Submitted);

        let status = orchestrator.present(&target, &acquired).expect("present");
        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(orchestrator.state(), FrameState::Idle);
        assert_eq!(orchestrator.frame_count(), frame + 1);
    }

    orchestrator.wait_all().expect("drain");
    // Present submissions carry no fence
    device.wait_idle().expect("idle");
}

#[test]
#[serial]
fn test_orchestrator_rejects_out_of_order_steps() {
    let device = require_gpu!();
    let target = HeadlessTarget::new(device.clone(), 2);
    let mut orchestrator =
        FrameOrchestrator::new(device.clone(), 2, 2, u64::MAX).expect("orchestrator");

    let acquired = orchestrator
        .acquire(&target)
        .expect("acquire")
        .expect("image");

    // Presenting before submit and recording after submit are refused
    assert!(orchestrator.present(&target, &acquired).is_err());
    orchestrator.record_with(&acquired, |_| Ok(())).expect("record");
    orchestrator.submit(&acquired).expect("submit");
    assert!(orchestrator.record_with(&acquired, |_| Ok(())).is_err());
    orchestrator.present(&target, &acquired).expect("present");

    orchestrator.wait_all().expect("drain");
    // Present submissions carry no fence
    device.wait_idle().expect("idle");
}

#[test]
#[serial]
fn test_orchestrator_lifecycle() {
    let device = require_gpu!();
    let mut orchestrator =
        FrameOrchestrator::new(device.clone(), 3, 2, u64::MAX).expect("orchestrator");

    assert_eq!(orchestrator.state(), FrameState::Idle);
    assert_eq!(orchestrator.frame_count(), 0);
    assert_eq!(orchestrator.wait_for_frame().expect("first frame"), 0);

    orchestrator.resize(2).expect("resize");
    orchestrator.wait_all().expect("drain");

    orchestrator.clear();
    orchestrator.clear();
    assert_eq!(orchestrator.state(), FrameState::Idle);
}
