#![allow(dead_code)]
//! Shared headless Vulkan device for GPU integration tests.
//!
//! One instance and device are created per test process. Tests call
//! [`test_device`] and return early when it yields `None`, which happens on
//! machines without a Vulkan loader or a usable GPU.

use std::sync::{Arc, OnceLock};

use forward_rhi::device::Device;
use forward_rhi::instance::{Instance, InstanceDesc};
use forward_rhi::physical_device::select_physical_device;

/// Instance and device kept alive for the whole test process.
struct GpuContext {
    device: Arc<Device>,
    _instance: Instance,
}

static GPU_CONTEXT: OnceLock<Option<GpuContext>> = OnceLock::new();

fn create_context() -> Option<GpuContext> {
    let desc = InstanceDesc {
        application_name: "forward-renderer tests".to_string(),
        ..InstanceDesc::default()
    };
    let instance = match Instance::new(&desc) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Skipping GPU tests: no Vulkan instance ({})", e);
            return None;
        }
    };
    let info = match select_physical_device(&instance, None) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Skipping GPU tests: no usable GPU ({})", e);
            return None;
        }
    };
    let device = match Device::new(&instance, &info) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Skipping GPU tests: device creation failed ({})", e);
            return None;
        }
    };
    Some(GpuContext {
        device,
        _instance: instance,
    })
}

/// Returns the shared headless device, or `None` if Vulkan is unavailable.
pub fn test_device() -> Option<Arc<Device>> {
    GPU_CONTEXT
        .get_or_init(create_context)
        .as_ref()
        .map(|context| context.device.clone())
}

/// Evaluates to the shared device or returns from the calling test.
macro_rules! require_gpu {
    () => {
        match crate::gpu_test_utils::test_device() {
            Some(device) => device,
            None => return,
        }
    };
}
