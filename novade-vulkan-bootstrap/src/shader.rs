use ash::util::read_spv;
use std::fs::File;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Resolves a shader name to SPIR-V words.
pub trait ShaderLoader {
    fn load(&self, name: &str) -> Result<Vec<u32>>;
}

/// Returns empty bytecode for every name.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullShaderLoader;

impl ShaderLoader for NullShaderLoader {
    fn load(&self, name: &str) -> Result<Vec<u32>> {
        tracing::debug!(
            target: "novade_vulkan_bootstrap",
            "no shader directory configured, {} is empty",
            name
        );
        Ok(Vec::new())
    }
}

/// Reads `<dir>/<name>` as a SPIR-V module.
#[derive(Debug, Clone)]
pub struct SpirvDirectoryLoader {
    dir: PathBuf,
}

impl SpirvDirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ShaderLoader for SpirvDirectoryLoader {
    fn load(&self, name: &str) -> Result<Vec<u32>> {
        let shader_error = |source| Error::Shader {
            name: name.to_string(),
            source,
        };
        let mut file = File::open(self.dir.join(name)).map_err(shader_error)?;
        // read_spv rejects lengths that are not a multiple of four and fixes
        // up byte order from the magic number.
        read_spv(&mut file).map_err(shader_error)
    }
}
