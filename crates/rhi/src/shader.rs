//! Shader bytecode loading and shader modules.
//!
//! Shaders are compiled to SPIR-V ahead of time; this module only reads
//! and validates the bytecode and wraps the resulting `VkShaderModule`.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point every shader in this renderer uses.
pub const ENTRY_POINT: &CStr = c"main";

/// Programmable stages the graphics pipeline uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reads a compiled SPIR-V file and checks that it is well-formed bytecode.
///
/// # Errors
///
/// [`RhiError::ShaderCompile`] if the file cannot be read or is not SPIR-V.
pub fn load_compiled_shader(path: impl AsRef<Path>) -> RhiResult<Vec<u8>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| RhiError::ShaderCompile(format!("failed to read {}: {}", path.display(), e)))?;

    decode_spirv(&bytes)
        .map_err(|e| RhiError::ShaderCompile(format!("{}: {}", path.display(), e)))?;

    debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Decodes bytecode into words, checking alignment and the SPIR-V magic number.
fn decode_spirv(bytes: &[u8]) -> std::io::Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
}

/// A shader module for one pipeline stage.
///
/// Only needed until the pipeline that uses it has been created.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Builds a module from SPIR-V bytecode.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderCompile`] if the bytecode is malformed or the driver rejects it.
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = decode_spirv(bytes)
            .map_err(|e| RhiError::ShaderCompile(format!("{} shader: {}", stage, e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, None)
                .map_err(|e| RhiError::ShaderCompile(format!("{} shader: {}", stage, e)))?
        };

        debug!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
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

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn write_temp(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("trirender-{}-{}", std::process::id(), name));
        std::fs::write(&path, bytes).expect("write temp shader");
        path
    }

    fn minimal_spirv() -> Vec<u8> {
        // Header only: magic, version 1.0, generator, bound, schema.
        [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_load_missing_shader() {
        let err = load_compiled_shader("does/not/exist.spv").unwrap_err();
        assert!(matches!(err, RhiError::ShaderCompile(_)));
        assert!(err.to_string().contains("does/not/exist.spv"));
    }

    #[test]
    fn test_load_valid_shader() {
        let bytes = minimal_spirv();
        let path = write_temp("valid.spv", &bytes);

        let loaded = load_compiled_shader(&path).unwrap();
        assert_eq!(loaded, bytes);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_unaligned_bytecode() {
        let mut bytes = minimal_spirv();
        bytes.push(0);
        let path = write_temp("unaligned.spv", &bytes);

        let err = load_compiled_shader(&path).unwrap_err();
        assert!(matches!(err, RhiError::ShaderCompile(_)));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let bytes: Vec<u8> = [0xDEAD_BEEFu32, 0, 0, 0, 0]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect();
        assert!(decode_spirv(&bytes).is_err());
    }

    #[test]
    fn test_decode_word_count() {
        let words = decode_spirv(&minimal_spirv()).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }
}
