//! Sequences instance, surface, device and swapchain construction.
//!
//! [`VulkanBootstrap`] is a forward-only state machine. Each call to
//! [`advance`](VulkanBootstrap::advance) performs exactly one stage; a failing
//! stage tears down everything built so far, newest first, and leaves the
//! machine in [`PipelineState::TornDown`]. The one step back is a swapchain
//! rebuild that fails after retiring the old swapchain, which returns to
//! [`PipelineState::LogicalDeviceCreated`]. The error that comes back is the
//! deepest cause; the context's chain holds the rest of the story.

use ash::vk;
use std::ffi::{c_char, c_void, CStr, CString};

use crate::config::BootstrapConfig;
use crate::context::Context;
use crate::device_select::{select_physical_device, PhysicalDeviceCandidate};
use crate::driver::{DeviceApi, InstanceApi, Loader};
use crate::error::{CapabilityKind, Error, Result, ResultExt, Stage, VkResultExt};
use crate::extensions::{first_missing, raw_name, sort_names};
use crate::logging::Logger;
use crate::panel::{Panel, PanelDevice, PanelInstance};
use crate::shader::{NullShaderLoader, ShaderLoader, SpirvDirectoryLoader};
use crate::swapchain::{
    build_pipeline, create_pipeline, negotiate_swapchain, Pipeline, SwapchainTarget,
};
use crate::vector::Vector;
use crate::{severity_mask, vulkan_debug_callback};

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    Uninitialized,
    LibraryLoaded,
    InstanceCreated,
    SurfaceCreated,
    DeviceSelected,
    LogicalDeviceCreated,
    SwapchainReady,
    TornDown,
}

/// Queue handles of the logical device and the families they come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub present: vk::Queue,
    pub graphics_family: u32,
    pub compute_family: u32,
    pub present_family: u32,
}

pub struct VulkanBootstrap<'c, P: Panel> {
    ctx: &'c Context<'c>,
    config: BootstrapConfig,
    panel: P,
    state: PipelineState,

    loader: Option<P::Loader>,
    layers: Option<Vector<'c, CString>>,
    instance_extensions: Option<Vector<'c, CString>>,
    instance: Option<PanelInstance<P>>,
    // Boxed so the address handed to the driver as callback user data is stable.
    debug_logger: Option<Box<Logger>>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    surface: Option<vk::SurfaceKHR>,
    selected: Option<PhysicalDeviceCandidate<'c>>,
    device: Option<PanelDevice<P>>,
    queues: Option<Queues>,
    pipeline: Option<Pipeline<'c>>,
}

impl<'c, P: Panel> VulkanBootstrap<'c, P> {
    pub fn new(ctx: &'c Context<'c>, config: BootstrapConfig, panel: P) -> Self {
        Self {
            ctx,
            config,
            panel,
            state: PipelineState::Uninitialized,
            loader: None,
            layers: None,
            instance_extensions: None,
            instance: None,
            debug_logger: None,
            debug_messenger: None,
            surface: None,
            selected: None,
            device: None,
            queues: None,
            pipeline: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn context(&self) -> &'c Context<'c> {
        self.ctx
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    pub fn instance(&self) -> Option<&PanelInstance<P>> {
        self.instance.as_ref()
    }

    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }

    pub fn physical_device(&self) -> Option<&PhysicalDeviceCandidate<'c>> {
        self.selected.as_ref()
    }

    pub fn device(&self) -> Option<&PanelDevice<P>> {
        self.device.as_ref()
    }

    pub fn queues(&self) -> Option<Queues> {
        self.queues
    }

    pub fn pipeline(&self) -> Option<&Pipeline<'c>> {
        self.pipeline.as_ref()
    }

    /// Layers the instance was created with.
    pub fn enabled_layers(&self) -> &[CString] {
        self.layers.as_deref().unwrap_or_default()
    }

    pub fn enabled_instance_extensions(&self) -> &[CString] {
        self.instance_extensions.as_deref().unwrap_or_default()
    }

    /// Runs every remaining stage until the swapchain is ready.
    pub fn run(&mut self) -> Result<()> {
        while self.state != PipelineState::SwapchainReady {
            self.advance()?;
        }
        Ok(())
    }

    /// Performs the next stage and returns the state reached.
    pub fn advance(&mut self) -> Result<PipelineState> {
        let (outcome, next) = match self.state {
            PipelineState::Uninitialized => (self.load_library(), PipelineState::LibraryLoaded),
            PipelineState::LibraryLoaded => {
                (self.create_instance(), PipelineState::InstanceCreated)
            }
            PipelineState::InstanceCreated => {
                (self.create_surface(), PipelineState::SurfaceCreated)
            }
            PipelineState::SurfaceCreated => (self.select_device(), PipelineState::DeviceSelected),
            PipelineState::DeviceSelected => {
                (self.create_logical_device(), PipelineState::LogicalDeviceCreated)
            }
            PipelineState::LogicalDeviceCreated => {
                (self.create_pipeline(), PipelineState::SwapchainReady)
            }
            state @ (PipelineState::SwapchainReady | PipelineState::TornDown) => {
                return Err(self.ctx.fail(Error::InvalidState {
                    operation: "advance",
                    state,
                }));
            }
        };

        match outcome {
            Ok(()) => {
                self.state = next;
                Ok(next)
            }
            Err(err) => {
                let _ = self
                    .ctx
                    .push_error(format_args!("bootstrap failed in state {:?}", self.state));
                self.teardown();
                Err(err)
            }
        }
    }

    fn load_library(&mut self) -> Result<()> {
        let loader = self
            .panel
            .load_driver_library()
            .map_err(|source| self.ctx.fail(Error::Panel { stage: Stage::LoadLibrary, source }))?;
        self.loader = Some(loader);
        self.ctx.debug(format_args!("driver library loaded"));
        Ok(())
    }

    fn create_instance(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let loader = self.loader.as_ref().ok_or_else(|| missing_resource(ctx, Stage::Instance))?;

        let layers = available_layers(ctx, loader, &self.config)?;
        let panel_extensions = self
            .panel
            .required_instance_extensions()
            .map_err(|source| ctx.fail(Error::Panel { stage: Stage::InstanceExtensions, source }))?;
        let static_extensions = self.config.instance_extension_names().map_err(|e| ctx.fail(e))?;
        let extensions =
            gather_instance_extensions(ctx, loader, &panel_extensions, &static_extensions)?;

        let app_name = self.config.application_name_c().map_err(|e| ctx.fail(e))?;
        let engine_name = self.config.engine_name_c().map_err(|e| ctx.fail(e))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(self.config.application_version_raw())
            .engine_name(&engine_name)
            .engine_version(self.config.engine_version_raw())
            .api_version(self.config.api_version_raw());

        let layer_ptrs = name_pointers(ctx, &layers)?;
        let extension_ptrs = name_pointers(ctx, &extensions)?;

        let debugging = self.config.debugging;
        let mut debug_logger = Box::new(ctx.logger().clone());
        debug_logger.set_min_level(self.config.log_level());
        let user_data = &*debug_logger as *const Logger as *mut c_void;
        self.debug_logger = Some(debug_logger);

        let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(severity_mask(self.config.log_level()))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback))
            .user_data(user_data);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);
        if debugging {
            // Covers messages emitted while the instance itself is created.
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { loader.create_instance(&create_info) }.check(ctx, Stage::Instance)?;
        ctx.info(format_args!("Vulkan instance created successfully."));
        let instance = self.instance.insert(instance);
        self.layers = Some(layers);
        self.instance_extensions = Some(extensions);

        if debugging {
            let messenger = unsafe { instance.create_debug_messenger(&debug_info) }
                .check(ctx, Stage::DebugMessenger)?;
            self.debug_messenger = Some(messenger);
            ctx.info(format_args!("Vulkan debug messenger created successfully."));
        } else {
            self.debug_logger = None;
        }
        Ok(())
    }

    fn create_surface(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let instance = self.instance.as_ref().ok_or_else(|| missing_resource(ctx, Stage::Surface))?;
        let surface = self
            .panel
            .create_surface(instance)
            .map_err(|source| ctx.fail(Error::Panel { stage: Stage::Surface, source }))?;
        self.surface = Some(surface);
        ctx.info(format_args!("Vulkan surface created successfully."));
        Ok(())
    }

    fn select_device(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let instance = self.instance.as_ref()
            .ok_or_else(|| missing_resource(ctx, Stage::DeviceSelection))?;
        let surface = self.surface.ok_or_else(|| missing_resource(ctx, Stage::DeviceSelection))?;

        let names = self.config.device_extension_names().map_err(|e| ctx.fail(e))?;
        let required: Vec<&CStr> = names.iter().map(|n| n.as_c_str()).collect();
        let chosen = select_physical_device(ctx, instance, surface, &required)?;
        self.selected = Some(chosen);
        Ok(())
    }

    fn create_logical_device(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let instance = self.instance.as_ref()
            .ok_or_else(|| missing_resource(ctx, Stage::LogicalDevice))?;
        let selected = self.selected.as_ref()
            .ok_or_else(|| missing_resource(ctx, Stage::LogicalDevice))?;

        let family = |found: Option<u32>, role: &str| {
            found.ok_or_else(|| {
                ctx.fail(Error::MissingCapability {
                    kind: CapabilityKind::QueueFamily,
                    name: role.to_string(),
                })
            })
        };
        let graphics_family = family(selected.queues.graphics_family(), "graphics")?;
        let compute_family = family(selected.queues.compute_family(), "compute")?;
        let present_family = family(selected.queues.present_family(), "present")?;

        let queue_infos = queue_create_infos(ctx, graphics_family, compute_family, present_family)?;
        let extensions = self.config.device_extension_names().map_err(|e| ctx.fail(e))?;
        let extension_ptrs = name_pointers(ctx, &extensions)?;
        let features = selected.features;

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_features(&features)
            .enabled_extension_names(&extension_ptrs);

        let device = unsafe { instance.create_device(selected.handle, &create_info) }
            .check(ctx, Stage::LogicalDevice)?;
        ctx.info(format_args!("Logical device created successfully."));

        let queues = unsafe {
            Queues {
                graphics: device.queue(graphics_family, 0),
                compute: device.queue(compute_family, 0),
                present: device.queue(present_family, 0),
                graphics_family,
                compute_family,
                present_family,
            }
        };
        self.device = Some(device);
        self.queues = Some(queues);
        ctx.debug(format_args!(
            "queue families: graphics {}, compute {}, present {}",
            graphics_family, compute_family, present_family
        ));
        Ok(())
    }

    fn swapchain_target(&self) -> Result<SwapchainTarget> {
        let ctx = self.ctx;
        let selected = self.selected.as_ref()
            .ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;
        let surface = self.surface.ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;
        let queues = self.queues.ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;
        Ok(SwapchainTarget {
            physical_device: selected.handle,
            surface,
            graphics_family: queues.graphics_family,
            present_family: queues.present_family,
        })
    }

    fn create_pipeline(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let target = self.swapchain_target()?;
        let instance = self.instance.as_ref()
            .ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;
        let device = self.device.as_ref().ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;

        let pipeline = build_pipeline(
            ctx,
            instance,
            device,
            target,
            self.panel.drawable_size(),
            vk::SwapchainKHR::null(),
        )?;
        ctx.info(format_args!(
            "Swapchain created with {} images.",
            pipeline.images.len()
        ));
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Rebuilds the swapchain against the current surface state, e.g. after a
    /// resize.
    ///
    /// If negotiation fails (zero drawable, lost surface) nothing has been
    /// asked of the driver and the old pipeline is kept. Once creation has
    /// been attempted the old swapchain is retired even on failure, so the old
    /// pipeline is destroyed and the machine drops back to
    /// [`PipelineState::LogicalDeviceCreated`]; [`run`](Self::run) builds a
    /// fresh one.
    ///
    /// The caller must make sure no GPU work still uses the old images.
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let ctx = self.ctx;
        if self.state != PipelineState::SwapchainReady {
            return Err(ctx.fail(Error::InvalidState {
                operation: "recreate swapchain",
                state: self.state,
            }));
        }
        let target = self.swapchain_target()?;
        let instance = self.instance.as_ref()
            .ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;
        let device = self.device.as_ref().ok_or_else(|| missing_resource(ctx, Stage::Swapchain))?;
        let old_swapchain = self
            .pipeline
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |p| p.swapchain);

        let config = negotiate_swapchain(ctx, instance, target, self.panel.drawable_size())
            .chain(ctx, "recreating swapchain")?;
        let outcome = create_pipeline(ctx, device, target, config, old_swapchain);
        if let Some(old) = self.pipeline.take() {
            unsafe { old.destroy(device) };
        }
        match outcome {
            Ok(pipeline) => {
                self.pipeline = Some(pipeline);
                ctx.info(format_args!("Swapchain recreated."));
                Ok(())
            }
            Err(err) => {
                self.state = PipelineState::LogicalDeviceCreated;
                ctx.warn(format_args!("old swapchain retired; run again to rebuild it"));
                Err(err).chain(ctx, "recreating swapchain")
            }
        }
    }

    /// Blocks until the logical device is idle. Call before teardown while
    /// frames may be in flight.
    pub fn wait_idle(&self) -> Result<()> {
        match &self.device {
            Some(device) => unsafe { device.wait_idle() }.check(self.ctx, Stage::LogicalDevice),
            None => Ok(()),
        }
    }

    /// Loads SPIR-V from the configured shader directory, or empty bytecode
    /// when none is configured.
    pub fn load_shader(&self, name: &str) -> Result<Vec<u32>> {
        let words = match &self.config.shader_dir {
            Some(dir) => SpirvDirectoryLoader::new(dir).load(name),
            None => NullShaderLoader.load(name),
        };
        words.map_err(|e| self.ctx.fail(e))
    }

    /// Destroys everything built so far, newest first, and unloads the driver
    /// library. Safe to call from any state and more than once.
    pub fn teardown(&mut self) {
        if self.state == PipelineState::TornDown {
            return;
        }

        if let Some(pipeline) = self.pipeline.take() {
            if let Some(device) = &self.device {
                unsafe { pipeline.destroy(device) };
                self.ctx.debug(format_args!("swapchain destroyed"));
            }
        }
        self.queues = None;
        if let Some(device) = self.device.take() {
            unsafe { device.destroy() };
            self.ctx.debug(format_args!("logical device destroyed"));
        }
        self.selected = None;
        if let Some(instance) = &self.instance {
            if let Some(surface) = self.surface.take() {
                unsafe { instance.destroy_surface(surface) };
                self.ctx.debug(format_args!("surface destroyed"));
            }
            if let Some(messenger) = self.debug_messenger.take() {
                unsafe { instance.destroy_debug_messenger(messenger) };
                self.ctx.debug(format_args!("debug messenger destroyed"));
            }
        }
        if let Some(instance) = self.instance.take() {
            unsafe { instance.destroy() };
            self.ctx.debug(format_args!("instance destroyed"));
        }
        // The messenger chained into instance creation also reports during
        // instance destruction, so its user data must outlive the instance.
        self.debug_logger = None;
        self.instance_extensions = None;
        self.layers = None;
        if let Some(loader) = self.loader.take() {
            drop(loader);
            self.panel.unload_driver_library();
        }

        self.state = PipelineState::TornDown;
        self.ctx.info(format_args!("Vulkan resources torn down."));
    }
}

impl<P: Panel> Drop for VulkanBootstrap<'_, P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn missing_resource(ctx: &Context<'_>, stage: Stage) -> Error {
    ctx.fail(Error::ResourceCreationFailure { stage })
}

/// Drops requested layers the loader does not offer, with a warning.
fn available_layers<'c, L: Loader>(
    ctx: &'c Context<'c>,
    loader: &L,
    config: &BootstrapConfig,
) -> Result<Vector<'c, CString>> {
    let requested = config.validation_layer_names().map_err(|e| ctx.fail(e))?;
    let mut layers = Vector::with_capacity(ctx, requested.len())?;
    if requested.is_empty() {
        return Ok(layers);
    }

    let offered = loader.instance_layer_properties().check(ctx, Stage::ValidationLayers)?;
    for layer in requested {
        if offered.iter().any(|p| raw_name(&p.layer_name) == layer.as_c_str()) {
            layers.append(layer)?;
        } else {
            ctx.warn(format_args!(
                "validation layer {} is not available, skipping",
                layer.to_string_lossy()
            ));
        }
    }
    Ok(layers)
}

/// Union of panel and static instance extensions, checked against what the
/// loader offers. Returned sorted and deduplicated.
pub fn gather_instance_extensions<'c, L: Loader>(
    ctx: &'c Context<'c>,
    loader: &L,
    panel_extensions: &[CString],
    static_extensions: &[CString],
) -> Result<Vector<'c, CString>> {
    let mut wanted = Vector::with_capacity(ctx, panel_extensions.len() + static_extensions.len())?;
    for name in panel_extensions.iter().chain(static_extensions) {
        wanted.append(name.clone())?;
    }
    wanted.sort();
    wanted.dedup();

    let offered = loader
        .instance_extension_properties()
        .check(ctx, Stage::InstanceExtensions)?;
    let mut available: Vec<&CStr> = offered.iter().map(|p| raw_name(&p.extension_name)).collect();
    sort_names(&mut available);
    let required: Vec<&CStr> = wanted.iter().map(|n| n.as_c_str()).collect();

    if let Some(missing) = first_missing(&required, &available) {
        return Err(ctx.fail(Error::MissingCapability {
            kind: CapabilityKind::InstanceExtension,
            name: missing.to_string_lossy().into_owned(),
        }));
    }
    Ok(wanted)
}

/// One descriptor per distinct family: graphics always, then present and
/// compute when they differ from every family already listed.
pub fn queue_create_infos<'c>(
    ctx: &'c Context<'c>,
    graphics_family: u32,
    compute_family: u32,
    present_family: u32,
) -> Result<Vector<'c, vk::DeviceQueueCreateInfo>> {
    let mut infos: Vector<'c, vk::DeviceQueueCreateInfo> = Vector::new(ctx)?;
    let mut families: Vector<'c, u32> = Vector::new(ctx)?;
    for family in [graphics_family, present_family, compute_family] {
        if families.contains(&family) {
            continue;
        }
        families.append(family)?;
        infos.append(
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build(),
        )?;
    }
    Ok(infos)
}

fn name_pointers<'c>(ctx: &'c Context<'c>, names: &[CString]) -> Result<Vector<'c, *const c_char>> {
    let mut ptrs = Vector::with_capacity(ctx, names.len())?;
    for name in names {
        ptrs.append(name.as_ptr())?;
    }
    Ok(ptrs)
}
