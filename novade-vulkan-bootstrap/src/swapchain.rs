use ash::vk;

use crate::context::Context;
use crate::driver::{DeviceApi, InstanceApi};
use crate::error::{Error, Result, ResultExt, Stage, VkResultExt};
use crate::guard::UndoStack;
use crate::vector::Vector;

/// The surface format used when the driver has no preference.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What a surface supports right now. Queried fresh for every negotiation.
#[derive(Debug)]
pub struct SwapchainCapabilities<'c> {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vector<'c, vk::SurfaceFormatKHR>,
    pub present_modes: Vector<'c, vk::PresentModeKHR>,
}

impl<'c> SwapchainCapabilities<'c> {
    pub fn query<I: InstanceApi>(
        ctx: &'c Context<'c>,
        instance: &I,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let capabilities = unsafe { instance.surface_capabilities(physical_device, surface) }
            .check(ctx, Stage::SurfaceQuery)?;
        let formats = unsafe { instance.surface_formats(physical_device, surface) }
            .check(ctx, Stage::SurfaceQuery)?;
        let present_modes =
            unsafe { instance.surface_present_modes(physical_device, surface) }
                .check(ctx, Stage::SurfaceQuery)?;

        Ok(Self {
            capabilities,
            formats: Vector::from_vec(ctx, formats)?,
            present_modes: Vector::from_vec(ctx, present_modes)?,
        })
    }
}

/// `None` only when the driver reports no formats at all.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(PREFERRED_SURFACE_FORMAT),
        [first, ..] => Some(
            formats
                .iter()
                .copied()
                .find(|f| {
                    f.format == PREFERRED_SURFACE_FORMAT.format
                        && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
                })
                .unwrap_or(*first),
        ),
    }
}

/// Mailbox when offered, otherwise FIFO (always available).
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A bounded maximum means the surface dictates its size; otherwise the
/// drawable size is clamped to the maximum per axis.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable: (u32,
    u32),
) -> vk::Extent2D {
    let max = capabilities.max_image_extent;
    if max.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable.0.min(max.width),
            height: drawable.1.min(max.height),
        }
    }
}

/// One more than the minimum so the CPU does not block on presentation,
/// unless the driver fixes the count.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    if min == 0 {
        1
    } else if min == capabilities.max_image_count {
        min
    } else {
        min + 1
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    Exclusive,
    Concurrent([u32; 2]),
}

impl Sharing {
    pub fn for_families(graphics: u32, present: u32) -> Self {
        if graphics == present {
            Sharing::Exclusive
        } else {
            Sharing::Concurrent([graphics, present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Sharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            Sharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_families(&self) -> &[u32] {
        match self {
            Sharing::Exclusive => &[],
            Sharing::Concurrent(families) => families,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: Sharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    pub fn negotiate(
        ctx: &Context<'_>,
        caps: &SwapchainCapabilities<'_>,
        drawable: (u32, u32),
        graphics_family: u32,
        present_family: u32,
    ) -> Result<Self> {
        let Some(surface_format) = choose_surface_format(&caps.formats) else {
            let _ = ctx.push_error(format_args!("surface reports no formats"));
            return Err(ctx.fail(Error::ResourceCreationFailure { stage: Stage::SurfaceQuery }));
        };

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&caps.present_modes),
            extent: choose_extent(&caps.capabilities, drawable),
            image_count: choose_image_count(&caps.capabilities),
            sharing: Sharing::for_families(graphics_family, present_family),
            pre_transform: caps.capabilities.current_transform,
        })
    }

    pub fn create_info(
        &self,
        surface: vk::SurfaceKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> vk::SwapchainCreateInfoKHRBuilder<'_> {
        vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(self.sharing.mode())
            .queue_family_indices(self.sharing.queue_families())
            .pre_transform(self.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain)
    }
}

/// A swapchain with one color view per image.
#[derive(Debug)]
pub struct Pipeline<'c> {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vector<'c, vk::Image>,
    pub image_views: Vector<'c, vk::ImageView>,
    pub config: SwapchainConfig,
}

impl Pipeline<'_> {
    /// Destroys the views, newest first, then the swapchain.
    ///
    /// # Safety
    /// The device must be the one the pipeline was built on and no GPU work
    /// may still reference its images.
    pub unsafe fn destroy<D: DeviceApi>(self, device: &D) {
        for &view in self.image_views.iter().rev() {
            device.destroy_image_view(view);
        }
        device.destroy_swapchain(self.swapchain);
    }
}

/// Where the swapchain goes and which queues touch it.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainTarget {
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub graphics_family: u32,
    pub present_family: u32,
}

/// Negotiates a configuration and builds the swapchain and its views.
///
/// On failure nothing built here survives: views are destroyed newest first,
/// then the swapchain. `old_swapchain` is handed to the driver for reuse and is
/// never destroyed here.
pub fn build_pipeline<'c, I: InstanceApi, D: DeviceApi>(
    ctx: &'c Context<'c>,
    instance: &I,
    device: &D,
    target: SwapchainTarget,
    drawable: (u32, u32),
    old_swapchain: vk::SwapchainKHR,
) -> Result<Pipeline<'c>> {
    let config = negotiate_swapchain(ctx, instance, target, drawable)?;
    create_pipeline(ctx, device, target, config, old_swapchain)
}

/// Queries the surface and settles on a configuration. Makes no driver object.
pub fn negotiate_swapchain<'c, I: InstanceApi>(
    ctx: &'c Context<'c>,
    instance: &I,
    target: SwapchainTarget,
    drawable: (u32, u32),
) -> Result<SwapchainConfig> {
    if drawable.0 == 0 || drawable.1 == 0 {
        let _ = ctx.push_error(format_args!("drawable size is {}x{}", drawable.0, drawable.1));
        return Err(ctx.fail(Error::ResourceCreationFailure { stage: Stage::Swapchain }));
    }

    let caps = SwapchainCapabilities::query(ctx, instance, target.physical_device, target.surface)?;
    let config = SwapchainConfig::negotiate(
        ctx,
        &caps,
        drawable,
        target.graphics_family,
        target.present_family,
    )?;
    // A minimized window reports a zero current extent.
    if config.extent.width == 0 || config.extent.height == 0 {
        let _ = ctx.push_error(format_args!(
            "negotiated extent is {}x{}",
            config.extent.width, config.extent.height
        ));
        return Err(ctx.fail(Error::ResourceCreationFailure { stage: Stage::Swapchain }));
    }
    ctx.debug(format_args!(
        "swapchain {:?}/{:?}, {:?}, {}x{}, {} images, {:?}",
        config.surface_format.format,
        config.surface_format.color_space,
        config.present_mode,
        config.extent.width,
        config.extent.height,
        config.image_count,
        config.sharing.mode()
    ));
    Ok(config)
}

/// Builds the swapchain and its views from a negotiated `config`.
///
/// Once the driver has been asked for a swapchain, `old_swapchain` is retired
/// whether or not the call succeeds.
pub fn create_pipeline<'c, D: DeviceApi>(
    ctx: &'c Context<'c>,
    device: &D,
    target: SwapchainTarget,
    config: SwapchainConfig,
    old_swapchain: vk::SwapchainKHR,
) -> Result<Pipeline<'c>> {
    let create_info = config.create_info(target.surface, old_swapchain);
    let swapchain = unsafe { device.create_swapchain(&create_info) }.check(ctx, Stage::Swapchain)?;
    let mut undo = UndoStack::new();
    undo.push("swapchain", move || unsafe { device.destroy_swapchain(swapchain) });

    let images = unsafe { device.swapchain_images(swapchain) }.check(ctx, Stage::SwapchainImages)?;
    let images = Vector::from_vec(ctx, images)?;

    let mut image_views = Vector::with_capacity(ctx, images.len())?;
    for (index, &image) in images.iter().enumerate() {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(config.surface_format.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&view_info) }
            .check(ctx, Stage::ImageViews)
            .chain(ctx, &format!("image {} of {}", index + 1, images.len()))?;
        undo.push("image view", move || unsafe { device.destroy_image_view(view) });
        image_views.append(view)?;
    }

    undo.commit();
    Ok(Pipeline {
        swapchain,
        images,
        image_views,
        config,
    })
}
