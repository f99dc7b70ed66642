//! Physical device discovery and selection.
//!
//! A device is usable when some family does graphics, some family does
//! compute, some family can present to the target surface, and it exposes
//! every required device extension. The first usable dedicated GPU wins; the
//! first usable integrated GPU is kept as a fallback for when no dedicated GPU
//! qualifies. Other device types are never chosen.

use ash::vk;
use std::borrow::Cow;
use std::ffi::CStr;

use crate::context::Context;
use crate::driver::InstanceApi;
use crate::error::{Error, Result, ResultExt, Stage, VkResultExt};
use crate::extensions::{first_missing, raw_name};
use crate::vector::Vector;

/// Every queue family index that can serve each role.
#[derive(Debug)]
pub struct QueueIndices<'c> {
    pub graphics: Vector<'c, u32>,
    pub compute: Vector<'c, u32>,
    pub present: Vector<'c, u32>,
}

impl<'c> QueueIndices<'c> {
    pub fn new(ctx: &'c Context<'c>) -> Result<Self> {
        Ok(Self {
            graphics: Vector::new(ctx)?,
            compute: Vector::new(ctx)?,
            present: Vector::new(ctx)?,
        })
    }

    pub fn is_complete(&self) -> bool {
        !self.graphics.is_empty() && !self.compute.is_empty() && !self.present.is_empty()
    }

    /// Family used for graphics: the first graphics family found.
    pub fn graphics_family(&self) -> Option<u32> {
        self.graphics.first().copied()
    }

    pub fn compute_family(&self) -> Option<u32> {
        self.compute.first().copied()
    }

    /// Family used for presentation. The graphics family is preferred when it
    /// can present, which keeps the swapchain in exclusive sharing mode.
    pub fn present_family(&self) -> Option<u32> {
        match self.graphics_family() {
            Some(g) if self.present.contains(&g) => Some(g),
            _ => self.present.first().copied(),
        }
    }

    pub fn clear(&mut self) {
        self.graphics.clear();
        self.compute.clear();
        self.present.clear();
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            graphics: self.graphics.try_clone()?,
            compute: self.compute.try_clone()?,
            present: self.present.try_clone()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Dedicated,
    Integrated,
    Other,
}

impl From<vk::PhysicalDeviceType> for DeviceClass {
    fn from(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::DISCRETE_GPU => DeviceClass::Dedicated,
            vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceClass::Integrated,
            _ => DeviceClass::Other,
        }
    }
}

#[derive(Debug)]
pub struct PhysicalDeviceCandidate<'c> {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub class: DeviceClass,
    pub queues: QueueIndices<'c>,
    pub extensions_supported: bool,
}

impl PhysicalDeviceCandidate<'_> {
    pub fn name(&self) -> Cow<'_, str> {
        raw_name(&self.properties.device_name).to_string_lossy()
    }

    /// `(major, minor, patch)` of the supported Vulkan API.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let v = self.properties.api_version;
        (
            vk::api_version_major(v),
            vk::api_version_minor(v),
            vk::api_version_patch(v),
        )
    }

    pub fn is_usable(&self) -> bool {
        self.queues.is_complete() && self.extensions_supported
    }
}

/// Reads one device's properties, queue roles and extension support.
///
/// Extensions are only checked for devices that have all three queue roles.
/// `required` must be sorted.
pub fn evaluate_device<'c, I: InstanceApi>(
    ctx: &'c Context<'c>,
    instance: &I,
    handle: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    required: &[&CStr],
) -> Result<PhysicalDeviceCandidate<'c>> {
    let properties = unsafe { instance.physical_device_properties(handle) };
    let features = unsafe { instance.physical_device_features(handle) };
    let families = Vector::from_vec(ctx, unsafe { instance.queue_family_properties(handle) })?;

    let mut queues = QueueIndices::new(ctx)?;
    for (index, family) in (0u32..).zip(families.iter()) {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            queues.graphics.append(index)?;
        }
        if family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            queues.compute.append(index)?;
        }
        let presents = unsafe { instance.surface_support(handle, index, surface) }
            .check(ctx, Stage::DeviceSelection)?;
        if presents {
            queues.present.append(index)?;
        }
    }

    let mut candidate = PhysicalDeviceCandidate {
        handle,
        properties,
        features,
        class: DeviceClass::from(properties.device_type),
        queues,
        extensions_supported: false,
    };
    if !candidate.queues.is_complete() {
        return Ok(candidate);
    }

    let available = Vector::from_vec(
        ctx,
        unsafe { instance.device_extension_properties(handle) }.check(ctx, Stage::DeviceSelection)?,
    )?;
    let mut names = Vector::with_capacity(ctx, available.len())?;
    for ext in available.iter() {
        names.append(raw_name(&ext.extension_name))?;
    }
    names.sort();

    match first_missing(required, &names) {
        None => candidate.extensions_supported = true,
        Some(missing) => ctx.debug(format_args!(
            "{} lacks device extension {}",
            candidate.name(),
            missing.to_string_lossy()
        )),
    }
    Ok(candidate)
}

/// Picks the GPU to build the logical device on.
///
/// Fails with [`Error::NoSuitableDevice`] when neither a dedicated nor an
/// integrated GPU qualifies.
pub fn select_physical_device<'c, I: InstanceApi>(
    ctx: &'c Context<'c>,
    instance: &I,
    surface: vk::SurfaceKHR,
    required: &[&CStr],
) -> Result<PhysicalDeviceCandidate<'c>> {
    debug_assert!(required.windows(2).all(|w| w[0] <= w[1]), "required extensions must be sorted");

    let handles =
        unsafe { instance.enumerate_physical_devices() }.check(ctx, Stage::DeviceSelection)?;
    let handles = Vector::from_vec(ctx, handles)?;
    ctx.debug(format_args!("found {} physical devices", handles.len()));

    let mut fallback = None;
    for &handle in handles.iter() {
        let candidate = evaluate_device(ctx, instance, handle, surface, required)
            .chain(ctx, "evaluating physical device")?;
        if !candidate.is_usable() {
            ctx.debug(format_args!("skipping unusable device {}", candidate.name()));
            continue;
        }

        let class = candidate.class;
        let (major, minor, patch) = candidate.api_version();
        ctx.debug(format_args!(
            "usable device {} ({:?}), Vulkan {}.{}.{}",
            candidate.name(),
            class,
            major,
            minor,
            patch
        ));

        match class {
            DeviceClass::Dedicated => {
                ctx.info(format_args!("selected dedicated GPU {}", candidate.name()));
                return Ok(candidate);
            }
            DeviceClass::Integrated if fallback.is_none() => fallback = Some(candidate),
            _ => {}
        }
    }

    match fallback {
        Some(candidate) => {
            ctx.info(format_args!("selected fallback GPU {}", candidate.name()));
            Ok(candidate)
        }
        None => Err(ctx.fail(Error::NoSuitableDevice)),
    }
}
