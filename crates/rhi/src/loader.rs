//! Process-wide Vulkan library loading.
//!
//! The Vulkan loader is opened at most once per process. Every
//! [`Instance`](crate::instance::Instance) borrows the same [`Entry`].

use std::sync::OnceLock;

use ash::Entry;
use tracing::info;

use crate::error::RhiResult;

static ENTRY: OnceLock<Entry> = OnceLock::new();

/// Returns the process-wide Vulkan entry, loading the library on first use.
///
/// # Errors
///
/// Returns [`RhiError::LoadingError`](crate::RhiError::LoadingError) if the
/// Vulkan library cannot be found. A failed load is not cached, so a later
/// call retries.
pub fn entry() -> RhiResult<&'static Entry> {
    if let Some(entry) = ENTRY.get() {
        return Ok(entry);
    }

    let loaded = unsafe { Entry::load()? };
    let entry = ENTRY.get_or_init(|| {
        info!("Vulkan library loaded");
        loaded
    });
    Ok(entry)
}

/// Returns whether the Vulkan library has been loaded in this process.
#[inline]
pub fn is_loaded() -> bool {
    ENTRY.get().is_some()
}
