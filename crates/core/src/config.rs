//! Renderer configuration.
//!
//! [`RendererConfig`] carries the tunables the frame lifecycle core needs at
//! construction time. Every section uses `#[serde(default)]`, so a host can
//! load a partial TOML document and only override what it cares about.
//!
//! # Example
//!
//! ```
//! use forward_core::{RendererConfig, VsyncPreference};
//!
//! let config = RendererConfig::from_toml_str(
//!     r#"
//!     frames_in_flight = 2
//!     vsync = "triple_buffering"
//!
//!     [lights]
//!     point = 32
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.frames_in_flight, 2);
//! assert_eq!(config.vsync, VsyncPreference::TripleBuffering);
//! assert_eq!(config.lights.point, 32);
//! assert_eq!(config.lights.directional, 4);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Upper bound on virtual frames a host may request.
const MAX_FRAMES_IN_FLIGHT: u32 = 8;

/// Acquire timeout used in release builds when none is configured.
const RELEASE_ACQUIRE_TIMEOUT_MS: u64 = 1000;

/// Requested presentation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VsyncPreference {
    /// Present immediately, tearing allowed.
    Off,
    /// Wait for vertical blank.
    #[default]
    On,
    /// Wait for vertical blank unless the frame is late.
    Relaxed,
    /// Mailbox presentation with three images.
    TripleBuffering,
}

/// Paths to the precompiled SPIR-V stages of the forward pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/forward.vert.spv"),
            fragment: PathBuf::from("shaders/forward.frag.spv"),
        }
    }
}

/// Fixed capacities of the light uniform blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightCapacity {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
}

impl Default for LightCapacity {
    fn default() -> Self {
        Self {
            directional: 4,
            point: 16,
            spot: 8,
        }
    }
}

/// Root configuration for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of virtual frames the CPU may prepare ahead of the GPU.
    pub frames_in_flight: u32,
    /// Desired presentation mode; negotiated down if unsupported.
    pub vsync: VsyncPreference,
    /// Swapchain acquire timeout. `None` picks the build-dependent default.
    pub acquire_timeout_ms: Option<u64>,
    /// Enable validation layers. `None` enables them in debug builds.
    pub validation: Option<bool>,
    /// Color the forward pass clears to.
    pub clear_color: [f32; 4],
    pub shaders: ShaderPaths,
    pub lights: LightCapacity,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            vsync: VsyncPreference::default(),
            acquire_timeout_ms: None,
            validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderPaths::default(),
            lights: LightCapacity::default(),
        }
    }
}

impl RendererConfig {
    /// Loads and validates a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// fails [`RendererConfig::validate`].
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;

        info!("Loaded renderer configuration from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }

        if self.lights.directional == 0 || self.lights.point == 0 || self.lights.spot == 0 {
            return Err(Error::Config(
                "light capacities must be at least 1".to_string(),
            ));
        }

        if self.acquire_timeout_ms == Some(0) {
            return Err(Error::Config(
                "acquire_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the swapchain acquire timeout in nanoseconds.
    ///
    /// Unset means effectively infinite in debug builds and bounded in
    /// release builds.
    pub fn acquire_timeout_ns(&self) -> u64 {
        match self.acquire_timeout_ms {
            Some(ms) => Duration::from_millis(ms).as_nanos().min(u64::MAX as u128) as u64,
            None if cfg!(debug_assertions) => u64::MAX,
            None => Duration::from_millis(RELEASE_ACQUIRE_TIMEOUT_MS).as_nanos() as u64,
        }
    }

    /// Returns whether validation layers should be requested.
    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.validation.unwrap_or(cfg!(debug_assertions))
    }
}
