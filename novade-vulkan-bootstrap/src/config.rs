//! Bootstrap configuration.
//!
//! Computed once by the caller and handed to the orchestrator. Usually
//! deserialized from TOML; every field is optional and unknown fields are
//! rejected.
//!
//! ```toml
//! application_name = "nova-shell"
//! application_version = [0, 1, 0]
//! debugging = true
//! device_extensions = ["VK_KHR_swapchain", "VK_KHR_maintenance2"]
//! log_level = "info"
//! ```

use ash::vk;
use serde::Deserialize;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logging::LogLevel;

pub const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

fn default_application_name() -> String {
    "NovaDE".to_string()
}

fn default_engine_name() -> String {
    "NovaDE Vulkan Bootstrap".to_string()
}

fn default_version() -> [u32; 3] {
    [0, 1, 0]
}

fn default_api_version() -> [u32; 2] {
    [1, 3]
}

fn default_debugging() -> bool {
    cfg!(debug_assertions)
}

fn default_device_extensions() -> Vec<String> {
    vec!["VK_KHR_swapchain".to_string()]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapConfig {
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_version")]
    pub application_version: [u32; 3],
    #[serde(default = "default_engine_name")]
    pub engine_name: String,
    #[serde(default = "default_version")]
    pub engine_version: [u32; 3],
    /// `[major, minor]` of the Vulkan API to request.
    #[serde(default = "default_api_version")]
    pub api_version: [u32; 2],
    /// Enables validation layers and the debug messenger.
    #[serde(default = "default_debugging")]
    pub debugging: bool,
    /// Layers to request while debugging. Defaults to the Khronos validation
    /// layer.
    #[serde(default)]
    pub validation_layers: Option<Vec<String>>,
    /// Extra instance extensions beyond what the panel requires.
    #[serde(default)]
    pub instance_extensions: Vec<String>,
    #[serde(default = "default_device_extensions")]
    pub device_extensions: Vec<String>,
    /// Defaults to debug while debugging, otherwise info.
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    /// Directory holding compiled SPIR-V shaders.
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            application_version: default_version(),
            engine_name: default_engine_name(),
            engine_version: default_version(),
            api_version: default_api_version(),
            debugging: default_debugging(),
            validation_layers: None,
            instance_extensions: Vec::new(),
            device_extensions: default_device_extensions(),
            log_level: None,
            shader_dir: None,
        }
    }
}

impl BootstrapConfig {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.application_name.trim().is_empty() {
            return Err(Error::Config("application_name must not be empty".to_string()));
        }
        if self.api_version[0] < 1 {
            return Err(Error::Config(format!(
                "api_version {}.{} is older than 1.0",
                self.api_version[0], self.api_version[1]
            )));
        }
        let names = [&self.application_name, &self.engine_name]
            .into_iter()
            .chain(self.validation_layers.iter().flatten())
            .chain(&self.instance_extensions)
            .chain(&self.device_extensions);
        for name in names {
            if name.contains('\0') {
                return Err(Error::Config(format!("{name:?} contains a NUL byte")));
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level.unwrap_or(if self.debugging { LogLevel::Debug } else { LogLevel::Info })
    }

    pub fn api_version_raw(&self) -> u32 {
        vk::make_api_version(0, self.api_version[0], self.api_version[1], 0)
    }

    pub fn application_version_raw(&self) -> u32 {
        let [major, minor, patch] = self.application_version;
        vk::make_api_version(0, major, minor, patch)
    }

    pub fn engine_version_raw(&self) -> u32 {
        let [major, minor, patch] = self.engine_version;
        vk::make_api_version(0, major, minor, patch)
    }

    pub fn application_name_c(&self) -> Result<CString> {
        to_cstring(&self.application_name)
    }

    pub fn engine_name_c(&self) -> Result<CString> {
        to_cstring(&self.engine_name)
    }

    /// Layers to request. Empty unless debugging.
    pub fn validation_layer_names(&self) -> Result<Vec<CString>> {
        if !self.debugging {
            return Ok(Vec::new());
        }
        match &self.validation_layers {
            Some(layers) => layers.iter().map(|l| to_cstring(l)).collect(),
            None => Ok(vec![to_cstring(KHRONOS_VALIDATION_LAYER)?]),
        }
    }

    /// Static instance extensions, plus debug utils while debugging.
    pub fn instance_extension_names(&self) -> Result<Vec<CString>> {
        let mut names = self
            .instance_extensions
            .iter()
            .map(|e| to_cstring(e))
            .collect::<Result<Vec<_>>>()?;
        if self.debugging {
            names.push(ash::extensions::ext::DebugUtils::name().to_owned());
        }
        Ok(names)
    }

    /// Required device extensions, sorted and deduplicated.
    pub fn device_extension_names(&self) -> Result<Vec<CString>> {
        let mut names = self
            .device_extensions
            .iter()
            .map(|e| to_cstring(e))
            .collect::<Result<Vec<_>>>()?;
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::Config(format!("{s:?} contains a NUL byte")))
}
