//! SPIR-V shader modules.
//!
//! Both forward stages are compiled offline. A missing or malformed module
//! fails renderer construction; there is no fallback shader.

use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

/// Decodes a SPIR-V binary into code words.
///
/// Byte-swapped modules are accepted and converted to host order.
///
/// # Errors
///
/// [`RhiError::ShaderError`] if `bytes` is empty, not a whole number of
/// words, or does not start with [`SPIRV_MAGIC`].
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RhiError::ShaderError("empty SPIR-V module".to_string()));
    }

    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("malformed SPIR-V ({} bytes): {}", bytes.len(), e)))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(RhiError::ShaderError(format!(
            "not a SPIR-V module (magic {:#010x})",
            other
        ))),
        None => Err(RhiError::ShaderError("empty SPIR-V module".to_string())),
    }
}

/// A shader module plus the stage and entry point it is bound with.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Loads and creates a module from a `.spv` file.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderError`] if the file cannot be read or is not valid
    /// SPIR-V, or the Vulkan error from module creation.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::ShaderError(format!("{} shader {}: {}", stage, path.display(), e)))?;
        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a module from an in-memory SPIR-V binary.
    ///
    /// # Errors
    ///
    /// See [`Shader::from_spirv_file`].
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|_| RhiError::ShaderError(format!("{} entry point contains NUL", stage)))?;

        let module = unsafe {
            device
                .handle()
                .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(&code), None)?
        };
        debug!("{} shader module: {} words", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage description for pipeline creation; borrows the entry point.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.to_vk_stage(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_rejects_empty_and_partial_words() {
        assert!(matches!(spirv_words(&[]), Err(RhiError::ShaderError(_))));

        let mut bytes = encode(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_rejects_foreign_data() {
        let bytes = encode(&[0x464c_457f, 0]);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_accepts_both_byte_orders() {
        let words = [SPIRV_MAGIC, 0x0001_0300, 7];
        assert_eq!(spirv_words(&encode(&words)).unwrap(), words);

        let swapped: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        assert_eq!(spirv_words(&swapped).unwrap(), words);
    }
}
