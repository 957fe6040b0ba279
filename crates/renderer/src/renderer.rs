//! The top-level forward renderer.
//!
//! [`Renderer`] owns every GPU object of the core and drives frames. Windowing
//! code supplies the instance, the surface and the window extent; assets and
//! scene are read through the [`Assets`] and [`Scene`] traits.
//!
//! # Example
//!
//! ```no_run
//! use forward_core::RendererConfig;
//! use forward_renderer::{FrameStatus, Renderer};
//! use forward_resources::AssetSet;
//! use forward_rhi::instance::Instance;
//! use forward_rhi::surface::Surface;
//! use forward_rhi::vk;
//! use forward_scene::SceneData;
//!
//! # fn example(instance: Instance, surface: Surface, assets: AssetSet, scene: SceneData)
//! #     -> Result<(), forward_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 1280, height: 720 };
//! let mut renderer = Renderer::new(
//!     instance,
//!     surface,
//!     &assets,
//!     &scene,
//!     RendererConfig::default(),
//!     extent,
//! )?;
//!
//! loop {
//!     match renderer.render_frame(&scene)? {
//!         FrameStatus::Presented => {}
//!         FrameStatus::Suboptimal | FrameStatus::OutOfDate => {
//!             renderer.recreate_swapchain(extent)?;
//!         }
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use forward_core::RendererConfig;
use forward_resources::uniform::SceneBlock;
use forward_resources::{Assets, MaterialIndexTable};
use forward_rhi::device::Device;
use forward_rhi::instance::Instance;
use forward_rhi::physical_device::select_physical_device;
use forward_rhi::surface::Surface;
use forward_rhi::swapchain::{Swapchain, VsyncMode};
use forward_rhi::{RhiError, RhiResult};
use forward_scene::Scene;

use crate::batch::{DrawBatch, gather_instances, instance_capacity};
use crate::forward_pass::ForwardPass;
use crate::geometry::StaticGeometryStore;
use crate::orchestrator::{FrameInputs, FrameOrchestrator, FrameStatus};
use crate::uniforms::DynamicBufferSet;

/// Forward renderer for one surface.
///
/// Fields are declared in destruction order: every component releases its
/// Vulkan objects before the last `Arc<Device>` goes, and the device goes
/// before the surface and the instance.
pub struct Renderer {
    forward_pass: ForwardPass,
    dynamic: DynamicBufferSet,
    geometry: StaticGeometryStore,
    orchestrator: FrameOrchestrator,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    /// Kept alive until everything created from it is gone.
    _instance: Instance,

    config: RendererConfig,
    materials: MaterialIndexTable,
    /// Draws recorded by the next frame, rebuilt by [`Renderer::update`].
    batches: Vec<DrawBatch>,
    cleared: bool,
}

impl Renderer {
    /// Builds the renderer: device, swapchain, synchronization and command
    /// buffers, static geometry, dynamic buffers and the forward pass, in
    /// that order.
    ///
    /// The dynamic buffer is sized for the instances of `scene` that
    /// reference a mesh of `assets`.
    ///
    /// # Errors
    ///
    /// Every failure is fatal: an invalid configuration, no suitable GPU,
    /// shader load failure, or any creation step. Whatever was created
    /// before the failure is released.
    pub fn new<A, S>(
        instance: Instance,
        surface: Surface,
        assets: &A,
        scene: &S,
        config: RendererConfig,
        window_extent: vk::Extent2D,
    ) -> RhiResult<Self>
    where
        A: Assets,
        S: Scene + ?Sized,
    {
        config
            .validate()
            .map_err(|e| RhiError::InvalidHandle(format!("invalid configuration: {}", e)))?;
        let frames_in_flight = config.frames_in_flight as usize;

        let info = select_physical_device(&instance, Some(&surface))?;
        let device = Device::new(&instance, &info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            &surface,
            VsyncMode::from(config.vsync),
            window_extent.width,
            window_extent.height,
        )?;

        let orchestrator = FrameOrchestrator::new(
            device.clone(),
            swapchain.image_count() as usize,
            frames_in_flight,
            config.acquire_timeout_ns(),
        )?;

        let geometry = StaticGeometryStore::new(device.clone(), assets)?;
        let materials = MaterialIndexTable::build(assets.materials());

        let capacity = instance_capacity(geometry.records(), scene);
        let dynamic = DynamicBufferSet::new(device.clone(), capacity, &config.lights, frames_in_flight)?;

        let forward_pass = ForwardPass::new(
            device.clone(),
            swapchain.format(),
            swapchain.extent(),
            swapchain.image_views(),
            dynamic.descriptor_set_layout(),
            &config.shaders,
        )?;

        info!(
            "Renderer initialized: {} swapchain image(s), {} frame(s) in flight, {} mesh(es), {} instance slot(s)",
            swapchain.image_count(),
            frames_in_flight,
            geometry.records().len(),
            capacity
        );

        Ok(Self {
            forward_pass,
            dynamic,
            geometry,
            orchestrator,
            swapchain,
            device,
            surface,
            _instance: instance,
            config,
            materials,
            batches: Vec::new(),
            cleared: false,
        })
    }

    /// Writes the scene into the next virtual frame's region.
    ///
    /// Blocks until that frame's previous submission completed. Instances are
    /// grouped per mesh in geometry order; the four uniform blocks follow.
    ///
    /// # Errors
    ///
    /// Returns an error if the renderer is cleared, the fence wait fails or
    /// a buffer write fails.
    pub fn update<S: Scene + ?Sized>(&mut self, scene: &S) -> RhiResult<()> {
        self.ensure_live()?;

        let frame_index = self.orchestrator.wait_for_frame()?;
        self.dynamic.update_mappings(frame_index)?;

        let gathered = gather_instances(
            self.geometry.records(),
            scene,
            &self.materials,
            self.dynamic.layout().instance_capacity,
        );
        self.dynamic.write_instances(&gathered.attributes)?;

        let camera = scene.camera();
        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let scene_block = SceneBlock::new(
            camera.view_matrix(),
            camera.projection_matrix(aspect),
            camera.position,
            scene.ambient_light(),
        );
        self.dynamic.write_scene(&scene_block)?;
        self.dynamic.write_lights(
            scene.directional_lights(),
            scene.point_lights(),
            scene.spot_lights(),
        )?;
        self.dynamic.flush_current()?;

        self.batches = gathered.batches;
        Ok(())
    }

    /// Updates from `scene` and renders one frame.
    ///
    /// [`FrameStatus::Suboptimal`] and [`FrameStatus::OutOfDate`] ask the
    /// caller to call [`Renderer::recreate_swapchain`].
    ///
    /// # Errors
    ///
    /// Any other failure (lost device or surface, timeout) is fatal; the
    /// renderer must be dropped and rebuilt.
    pub fn render_frame<S: Scene + ?Sized>(&mut self, scene: &S) -> RhiResult<FrameStatus> {
        self.update(scene)?;

        let inputs = FrameInputs {
            swapchain: &self.swapchain,
            pass: &self.forward_pass,
            geometry: &self.geometry,
            dynamic: &self.dynamic,
            batches: &self.batches,
            clear_color: self.config.clear_color,
        };
        self.orchestrator.run_frame(&inputs)
    }

    /// Recreates the swapchain, depth target and framebuffers for `extent`.
    ///
    /// A zero-sized extent (minimized window) is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if draining in-flight frames or any recreation step
    /// fails.
    pub fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.ensure_live()?;

        if extent.width == 0 || extent.height == 0 {
            debug!("Ignoring swapchain recreation at zero size");
            return Ok(());
        }

        self.orchestrator.wait_all()?;
        self.swapchain
            .recreate(&self.surface, extent.width, extent.height)?;
        self.orchestrator
            .resize(self.swapchain.image_count() as usize)?;

        if self.swapchain.format() == self.forward_pass.color_format() {
            self.forward_pass
                .recreate(self.swapchain.extent(), self.swapchain.image_views())?;
        } else {
            info!(
                "Swapchain format changed to {:?}, rebuilding forward pass",
                self.swapchain.format()
            );
            self.forward_pass.clear();
            self.forward_pass = ForwardPass::new(
                self.device.clone(),
                self.swapchain.format(),
                self.swapchain.extent(),
                self.swapchain.image_views(),
                self.dynamic.descriptor_set_layout(),
                &self.config.shaders,
            )?;
        }

        Ok(())
    }

    /// Waits for the device and releases every GPU object, in reverse
    /// creation order. Safe to call repeatedly.
    ///
    /// The device, surface and instance themselves are destroyed when the
    /// renderer is dropped.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }

        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer clear: {:?}", e);
        }

        self.forward_pass.clear();
        self.dynamic.clear();
        self.geometry.clear();
        self.orchestrator.clear();
        self.swapchain.clear();
        self.batches.clear();
        self.cleared = true;

        info!(
            "Renderer cleared after {} frame(s)",
            self.orchestrator.frame_count()
        );
    }

    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    fn ensure_live(&self) -> RhiResult<()> {
        if self.cleared {
            return Err(RhiError::InvalidHandle("renderer has been cleared".to_string()));
        }
        Ok(())
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn geometry(&self) -> &StaticGeometryStore {
        &self.geometry
    }

    #[inline]
    pub fn dynamic_buffers(&self) -> &DynamicBufferSet {
        &self.dynamic
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Number of frames presented so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.orchestrator.frame_count()
    }

    /// Draws recorded by the next frame.
    #[inline]
    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Renderer>();
    }
}
