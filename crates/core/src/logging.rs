//! Logging initialization and configuration.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,forward_rhi=debug,forward_renderer=debug";

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG)
/// - Target and thread id annotations
///
/// Only the first call installs the subscriber. Later calls, or a call made
/// after the host already installed its own global subscriber, return `false`.
///
/// # Example
/// ```
/// forward_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() -> bool {
    let mut installed = false;
    INSTALLED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .is_ok();
    });
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let _ = init_logging();
        assert!(!init_logging());
        tracing::debug!("still logging after repeated init");
    }
}
