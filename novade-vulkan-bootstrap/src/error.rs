//! Error taxonomy for the bootstrap core.
//!
//! Every fallible operation returns [`Result`] and, on failure, also records a
//! message on the owning [`Context`]'s error chain. Callers that add detail on
//! the way up use [`ResultExt::chain`], which pushes another message but keeps
//! the original (deepest) error as the returned value.

use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use thiserror::Error;

use crate::context::Context;
use crate::orchestrator::PipelineState;

pub type Result<T> = std::result::Result<T, Error>;

/// The step of the bootstrap sequence an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LoadLibrary,
    ValidationLayers,
    InstanceExtensions,
    Instance,
    DebugMessenger,
    Surface,
    DeviceSelection,
    LogicalDevice,
    SurfaceQuery,
    Swapchain,
    SwapchainImages,
    ImageViews,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadLibrary => "loading driver library",
            Stage::ValidationLayers => "preparing validation layers",
            Stage::InstanceExtensions => "preparing instance extensions",
            Stage::Instance => "creating instance",
            Stage::DebugMessenger => "creating debug messenger",
            Stage::Surface => "creating surface",
            Stage::DeviceSelection => "selecting physical device",
            Stage::LogicalDevice => "creating logical device",
            Stage::SurfaceQuery => "querying surface capabilities",
            Stage::Swapchain => "creating swapchain",
            Stage::SwapchainImages => "loading swapchain images",
            Stage::ImageViews => "creating image view",
        };
        f.write_str(name)
    }
}

/// What kind of driver capability was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    InstanceExtension,
    DeviceExtension,
    Layer,
    QueueFamily,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapabilityKind::InstanceExtension => "instance extension",
            CapabilityKind::DeviceExtension => "device extension",
            CapabilityKind::Layer => "layer",
            CapabilityKind::QueueFamily => "queue family",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailure { bytes: usize },

    #[error("{stage}: {code:?}")]
    DriverCallFailure { stage: Stage, code: vk::Result },

    #[error("missing {kind} {name}")]
    MissingCapability { kind: CapabilityKind, name: String },

    #[error("found no suitable GPU")]
    NoSuitableDevice,

    #[error("{stage}: resource creation failed")]
    ResourceCreationFailure { stage: Stage },

    #[error("error chain has no room left")]
    ErrorChainExhausted,

    #[error("slice [{begin}, {end}) out of bounds for count {count}")]
    SliceOutOfBounds { begin: usize, end: usize, count: usize },

    #[error("{stage}: {source}")]
    Panel {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot {operation} from state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("loading shader {name}: {source}")]
    Shader {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Adds context to a failing [`Result`] without replacing its error.
pub trait ResultExt<T> {
    fn chain(self, ctx: &Context<'_>, message: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn chain(self, ctx: &Context<'_>, message: &str) -> Result<T> {
        if self.is_err() {
            // An exhausted chain keeps its terminal meta-message; the error we
            // return still carries the original cause.
            let _ = ctx.push_error(format_args!("{message}"));
        }
        self
    }
}

/// Turns a raw driver result into [`Error::DriverCallFailure`], recording it.
pub trait VkResultExt<T> {
    fn check(self, ctx: &Context<'_>, stage: Stage) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn check(self, ctx: &Context<'_>, stage: Stage) -> Result<T> {
        self.map_err(|code| ctx.fail(Error::DriverCallFailure { stage, code }))
    }
}
