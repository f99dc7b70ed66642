//! Vulkan bootstrap for NovaDE: negotiates a GPU, a presentation surface and a
//! swapchain, and unwinds cleanly when any step fails.
//!
//! ```rust,ignore
//! use novade_vulkan_bootstrap::{BootstrapConfig, Context, VulkanBootstrap, WaylandPanel};
//!
//! novade_vulkan_bootstrap::init_minimal_logging();
//! let config = BootstrapConfig::load("bootstrap.toml")?;
//! let mut ctx = Context::create(None)?;
//! ctx.set_log_level(config.log_level());
//!
//! let panel = unsafe { WaylandPanel::new(display, surface, (width, height))? };
//! let mut vulkan = VulkanBootstrap::new(&ctx, config, panel);
//! if vulkan.run().is_err() {
//!     drop(vulkan);
//!     ctx.bail("could not bring up Vulkan");
//! }
//! ```

use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

mod alloc;
mod ash_driver;
mod config;
mod context;
mod device_select;
mod driver;
mod error;
mod error_chain;
mod extensions;
mod guard;
mod logging;
mod orchestrator;
mod panel;
mod shader;
mod swapchain;
mod vector;
#[cfg(feature = "wayland")]
mod wayland;

#[cfg(test)]
mod mock;

pub use alloc::{AllocStats, Allocator, LimitedAllocator, SystemAllocator};
pub use ash_driver::{AshDevice, AshInstance, AshLoader};
pub use config::{BootstrapConfig, KHRONOS_VALIDATION_LAYER};
pub use context::Context;
pub use device_select::{
    evaluate_device, select_physical_device, DeviceClass, PhysicalDeviceCandidate, QueueIndices,
};
pub use driver::{DeviceApi, InstanceApi, Loader};
pub use error::{CapabilityKind, Error, Result, ResultExt, Stage, VkResultExt};
pub use error_chain::{ChainExhausted, ErrorChain, ERROR_STACK_DEPTH, ERROR_TEXT_CAPACITY};
pub use extensions::{first_missing, raw_name};
pub use guard::UndoStack;
pub use logging::{init_minimal_logging, LogLevel, LogSink, Logger, TracingSink};
pub use orchestrator::{
    gather_instance_extensions, queue_create_infos, PipelineState, Queues, VulkanBootstrap,
};
pub use panel::{Panel, PanelDevice, PanelInstance};
pub use shader::{NullShaderLoader, ShaderLoader, SpirvDirectoryLoader};
pub use swapchain::{
    build_pipeline, choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    create_pipeline, negotiate_swapchain, Pipeline, Sharing, SwapchainCapabilities, SwapchainConfig,
    SwapchainTarget, PREFERRED_SURFACE_FORMAT,
};
pub use vector::{Slice, Vector, DEFAULT_CAPACITY};
#[cfg(feature = "wayland")]
pub use wayland::WaylandPanel;

/// Level a driver message is logged at. Informational driver chatter is
/// demoted to debug.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogLevel {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => LogLevel::Debug,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => LogLevel::Debug,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => LogLevel::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => LogLevel::Error,
        _ => LogLevel::Warn,
    }
}

/// Driver severities worth subscribing to for a logger at `level`.
pub(crate) fn severity_mask(level: LogLevel) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    match level {
        LogLevel::Debug => S::VERBOSE | S::INFO | S::WARNING | S::ERROR,
        LogLevel::Info | LogLevel::Warn => S::WARNING | S::ERROR,
        LogLevel::Error | LogLevel::Fatal => S::ERROR,
    }
}

/// Debug-utils callback. `p_user_data` is the [`Logger`] the messenger was
/// created with.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;
    let logger = &*(p_user_data as *const Logger);

    let message_id_number = callback_data.message_id_number;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    logger.log(
        severity_level(message_severity),
        format_args!(
            "[vulkan] type: {:?}, id: {} ({}), message: {}",
            message_type, message_id_name, message_id_number, message
        ),
    );
    vk::FALSE
}
