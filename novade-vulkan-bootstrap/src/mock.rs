//! Scripted driver and panel for tests.
//!
//! Every handle the mock hands out is tracked until destroyed; destroying an
//! unknown or already destroyed handle panics. Each create/destroy is appended
//! to an event log so tests can check ordering.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::rc::Rc;

use crate::driver::{DeviceApi, InstanceApi, Loader};
use crate::panel::Panel;

const PHYSICAL_DEVICE_BASE: u64 = 0x1000;

pub fn physical_device(index: usize) -> vk::PhysicalDevice {
    vk::PhysicalDevice::from_raw(PHYSICAL_DEVICE_BASE + index as u64)
}

#[derive(Debug, Clone)]
pub struct MockGpu {
    pub name: &'static str,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    /// Queue flags and present support, per family.
    pub families: Vec<(vk::QueueFlags, bool)>,
    pub extensions: Vec<&'static str>,
}

impl MockGpu {
    /// A GPU with no queue families and no extensions.
    pub fn bare(name: &'static str, device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            name,
            device_type,
            api_version: vk::make_api_version(0, 1, 3, 250),
            families: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// One family doing graphics, compute and present, plus VK_KHR_swapchain.
    pub fn complete(name: &'static str, device_type: vk::PhysicalDeviceType) -> Self {
        Self::bare(name, device_type)
            .family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)
            .extension("VK_KHR_swapchain")
    }

    pub fn family(mut self, flags: vk::QueueFlags, present: bool) -> Self {
        self.families.push((flags, present));
        self
    }

    pub fn extension(mut self, name: &'static str) -> Self {
        self.extensions.push(name);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedSwapchain {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_families: Vec<u32>,
    pub old_swapchain: vk::SwapchainKHR,
}

#[derive(Debug, Clone, Default)]
pub struct RecordedDevice {
    pub queue_families: Vec<u32>,
    pub extensions: Vec<String>,
    pub features_enabled: bool,
}

pub struct MockState {
    pub gpus: Vec<MockGpu>,
    pub instance_extensions: Vec<&'static str>,
    pub layers: Vec<&'static str>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub drawable: (u32, u32),
    /// Images per swapchain; the requested minimum when unset.
    pub image_count: Option<u32>,

    pub fail_library: bool,
    pub fail_instance: Option<vk::Result>,
    pub fail_debug_messenger: Option<vk::Result>,
    pub fail_surface: bool,
    pub fail_surface_query: Option<vk::Result>,
    pub fail_device: Option<vk::Result>,
    pub fail_swapchain: Option<vk::Result>,
    /// 1-indexed image-view call, counted per swapchain, that fails.
    pub fail_image_view_at: Option<usize>,

    pub instance_extensions_enabled: Vec<String>,
    pub layers_enabled: Vec<String>,
    pub device: Option<RecordedDevice>,
    pub swapchains: Vec<RecordedSwapchain>,
    pub debug_callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
    pub debug_user_data: *mut c_void,
    /// Runs inside `destroy` of the instance, before the handle is released.
    pub on_destroy_instance: Option<Box<dyn Fn()>>,

    next_handle: u64,
    image_view_calls: usize,
    images: BTreeMap<u64, Vec<vk::Image>>,
    live: BTreeMap<u64, &'static str>,
    events: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            gpus: Vec::new(),
            instance_extensions: vec![
                "VK_EXT_debug_utils",
                "VK_KHR_mock_surface",
                "VK_KHR_surface",
            ],
            layers: vec!["VK_LAYER_KHRONOS_validation"],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            drawable: (800, 600),
            image_count: None,
            fail_library: false,
            fail_instance: None,
            fail_debug_messenger: None,
            fail_surface: false,
            fail_surface_query: None,
            fail_device: None,
            fail_swapchain: None,
            fail_image_view_at: None,
            instance_extensions_enabled: Vec::new(),
            layers_enabled: Vec::new(),
            device: None,
            swapchains: Vec::new(),
            debug_callback: None,
            debug_user_data: std::ptr::null_mut(),
            on_destroy_instance: None,
            next_handle: 1,
            image_view_calls: 0,
            images: BTreeMap::new(),
            live: BTreeMap::new(),
            events: Vec::new(),
        }
    }
}

impl MockState {
    fn create(&mut self, kind: &'static str) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle, kind);
        self.events.push(format!("create {kind}"));
        handle
    }

    fn destroy(&mut self, kind: &'static str, handle: u64) {
        match self.live.remove(&handle) {
            Some(found) if found == kind => self.events.push(format!("destroy {kind}")),
            Some(found) => panic!("destroyed {found} {handle} as {kind}"),
            None => panic!("destroyed {kind} {handle} which is not live"),
        }
    }

    fn note(&mut self, event: &str) {
        self.events.push(event.to_string());
    }

    fn gpu(&self, pd: vk::PhysicalDevice) -> &MockGpu {
        &self.gpus[(pd.as_raw() - PHYSICAL_DEVICE_BASE) as usize]
    }
}

/// Shared handle to the scripted driver state.
#[derive(Clone, Default)]
pub struct MockDriver(Rc<RefCell<MockState>>);

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gpus(gpus: Vec<MockGpu>) -> Self {
        let driver = Self::new();
        driver.state().gpus = gpus;
        driver
    }

    pub fn state(&self) -> RefMut<'_, MockState> {
        self.0.borrow_mut()
    }

    pub fn loader(&self) -> MockLoader {
        MockLoader { driver: self.clone() }
    }

    pub fn panel(&self) -> MockPanel {
        MockPanel {
            driver: self.clone(),
            extensions: vec![
                CString::new("VK_KHR_surface").unwrap(),
                CString::new("VK_KHR_mock_surface").unwrap(),
            ],
        }
    }

    /// Creates an instance directly, skipping the orchestrator.
    pub fn instance(&self) -> MockInstance {
        let handle = self.state().create("instance");
        MockInstance {
            driver: self.clone(),
            handle: vk::Instance::from_raw(handle),
        }
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(self.state().create("surface"))
    }

    pub fn live(&self) -> Vec<&'static str> {
        self.0.borrow().live.values().copied().collect()
    }

    pub fn live_count(&self, kind: &str) -> usize {
        self.0.borrow().live.values().filter(|k| **k == kind).count()
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().events.clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().events.iter().filter(|e| *e == event).count()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }
}

fn name_array<const N: usize>(name: &str) -> [c_char; N] {
    let mut out = [0 as c_char; N];
    for (dst, b) in out.iter_mut().zip(name.bytes().take(N - 1)) {
        *dst = b as c_char;
    }
    out
}

fn extension_properties(name: &str) -> vk::ExtensionProperties {
    vk::ExtensionProperties {
        extension_name: name_array(name),
        spec_version: 1,
    }
}

unsafe fn read_names(names: *const *const c_char, count: u32) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(names, count as usize)
        .iter()
        .map(|&p| CStr::from_ptr(p).to_string_lossy().into_owned())
        .collect()
}

pub struct MockLoader {
    driver: MockDriver,
}

impl Loader for MockLoader {
    type Instance = MockInstance;

    fn instance_extension_properties(&self) -> VkResult<Vec<vk::ExtensionProperties>> {
        Ok(self
            .driver
            .0
            .borrow()
            .instance_extensions
            .iter()
            .map(|n| extension_properties(n))
            .collect())
    }

    fn instance_layer_properties(&self) -> VkResult<Vec<vk::LayerProperties>> {
        Ok(self
            .driver
            .0
            .borrow()
            .layers
            .iter()
            .map(|n| vk::LayerProperties {
                layer_name: name_array(n),
                ..Default::default()
            })
            .collect())
    }

    unsafe fn create_instance(&self, info: &vk::InstanceCreateInfo) -> VkResult<MockInstance> {
        let mut state = self.driver.state();
        if let Some(code) = state.fail_instance {
            return Err(code);
        }
        state.instance_extensions_enabled =
            read_names(info.pp_enabled_extension_names, info.enabled_extension_count);
        state.layers_enabled = read_names(info.pp_enabled_layer_names, info.enabled_layer_count);
        let handle = state.create("instance");
        Ok(MockInstance {
            driver: self.driver.clone(),
            handle: vk::Instance::from_raw(handle),
        })
    }
}

pub struct MockInstance {
    driver: MockDriver,
    handle: vk::Instance,
}

impl InstanceApi for MockInstance {
    type Device = MockDevice;

    fn handle(&self) -> vk::Instance {
        self.handle
    }

    unsafe fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let count = self.driver.0.borrow().gpus.len();
        Ok((0..count).map(physical_device).collect())
    }

    unsafe fn physical_device_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        let state = self.driver.0.borrow();
        let gpu = state.gpu(pd);
        vk::PhysicalDeviceProperties {
            api_version: gpu.api_version,
            device_type: gpu.device_type,
            device_name: name_array(gpu.name),
            ..Default::default()
        }
    }

    unsafe fn physical_device_features(
        &self,
        _pd: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        }
    }

    unsafe fn queue_family_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        let state = self.driver.0.borrow();
        state
            .gpu(pd)
            .families
            .iter()
            .map(|&(flags, _)| vk::QueueFamilyProperties {
                queue_flags: flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    unsafe fn device_extension_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        let state = self.driver.0.borrow();
        Ok(state.gpu(pd).extensions.iter().map(|n| extension_properties(n)).collect())
    }

    unsafe fn surface_support(
        &self,
        pd: vk::PhysicalDevice,
        family: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        let state = self.driver.0.borrow();
        Ok(state.gpu(pd).families[family as usize].1)
    }

    unsafe fn surface_capabilities(
        &self,
        _pd: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let state = self.driver.0.borrow();
        match state.fail_surface_query {
            Some(code) => Err(code),
            None => Ok(state.capabilities),
        }
    }

    unsafe fn surface_formats(
        &self,
        _pd: vk::PhysicalDevice,
        _s: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.driver.0.borrow().formats.clone())
    }

    unsafe fn surface_present_modes(
        &self,
        _pd: vk::PhysicalDevice,
        _s: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.driver.0.borrow().present_modes.clone())
    }

    unsafe fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let mut state = self.driver.state();
        if let Some(code) = state.fail_debug_messenger {
            return Err(code);
        }
        state.debug_callback = info.pfn_user_callback;
        state.debug_user_data = info.p_user_data;
        Ok(vk::DebugUtilsMessengerEXT::from_raw(state.create("debug messenger")))
    }

    unsafe fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        let mut state = self.driver.state();
        state.destroy("debug messenger", messenger.as_raw());
        state.debug_callback = None;
        state.debug_user_data = std::ptr::null_mut();
    }

    unsafe fn create_device(
        &self,
        _pd: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo,
    ) -> VkResult<MockDevice> {
        let mut state = self.driver.state();
        if let Some(code) = state.fail_device {
            return Err(code);
        }
        let queue_infos = std::slice::from_raw_parts(
            info.p_queue_create_infos,
            info.queue_create_info_count as usize,
        );
        state.device = Some(RecordedDevice {
            queue_families: queue_infos.iter().map(|q| q.queue_family_index).collect(),
            extensions: read_names(info.pp_enabled_extension_names, info.enabled_extension_count),
            features_enabled: !info.p_enabled_features.is_null()
                && (*info.p_enabled_features).sampler_anisotropy == vk::TRUE,
        });
        let handle = state.create("device");
        Ok(MockDevice {
            driver: self.driver.clone(),
            handle: vk::Device::from_raw(handle),
        })
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.driver.state().destroy("surface", surface.as_raw());
    }

    unsafe fn destroy(&self) {
        let hook = self.driver.state().on_destroy_instance.take();
        if let Some(hook) = hook {
            hook();
        }
        self.driver.state().destroy("instance", self.handle.as_raw());
    }
}

pub struct MockDevice {
    driver: MockDriver,
    handle: vk::Device,
}

impl MockDevice {
    /// Creates a device directly, skipping the orchestrator.
    pub fn create(driver: &MockDriver) -> Self {
        let handle = driver.state().create("device");
        Self {
            driver: driver.clone(),
            handle: vk::Device::from_raw(handle),
        }
    }
}

impl DeviceApi for MockDevice {
    fn handle(&self) -> vk::Device {
        self.handle
    }

    unsafe fn queue(&self, family_index: u32, _queue_index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x9000 + u64::from(family_index))
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.driver.state();
        if let Some(code) = state.fail_swapchain {
            return Err(code);
        }
        let families = if info.queue_family_index_count == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(
                info.p_queue_family_indices,
                info.queue_family_index_count as usize,
            )
            .to_vec()
        };
        state.swapchains.push(RecordedSwapchain {
            format: vk::SurfaceFormatKHR {
                format: info.image_format,
                color_space: info.image_color_space,
            },
            present_mode: info.present_mode,
            extent: info.image_extent,
            min_image_count: info.min_image_count,
            sharing_mode: info.image_sharing_mode,
            queue_families: families,
            old_swapchain: info.old_swapchain,
        });
        state.image_view_calls = 0;
        let handle = state.create("swapchain");
        let count = state.image_count.unwrap_or(info.min_image_count);
        let images = (0..count)
            .map(|i| vk::Image::from_raw(0x10_0000 + handle * 0x100 + u64::from(i)))
            .collect();
        state.images.insert(handle, images);
        Ok(vk::SwapchainKHR::from_raw(handle))
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.driver.state();
        state.destroy("swapchain", swapchain.as_raw());
        state.images.remove(&swapchain.as_raw());
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let state = self.driver.0.borrow();
        state
            .images
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    unsafe fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let mut state = self.driver.state();
        state.image_view_calls += 1;
        if state.fail_image_view_at == Some(state.image_view_calls) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok(vk::ImageView::from_raw(state.create("image view")))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.driver.state().destroy("image view", view.as_raw());
    }

    unsafe fn wait_idle(&self) -> VkResult<()> {
        self.driver.state().note("wait idle");
        Ok(())
    }

    unsafe fn destroy(&self) {
        self.driver.state().destroy("device", self.handle.as_raw());
    }
}

pub struct MockPanel {
    driver: MockDriver,
    extensions: Vec<CString>,
}

impl Panel for MockPanel {
    type Loader = MockLoader;

    fn load_driver_library(&mut self) -> anyhow::Result<MockLoader> {
        let mut state = self.driver.state();
        if state.fail_library {
            anyhow::bail!("libvulkan not found");
        }
        state.note("load library");
        Ok(self.driver.loader())
    }

    fn unload_driver_library(&mut self) {
        self.driver.state().note("unload library");
    }

    fn required_instance_extensions(&self) -> anyhow::Result<Vec<CString>> {
        Ok(self.extensions.clone())
    }

    fn create_surface(&mut self, _instance: &MockInstance) -> anyhow::Result<vk::SurfaceKHR> {
        let mut state = self.driver.state();
        if state.fail_surface {
            anyhow::bail!("compositor refused the surface");
        }
        Ok(vk::SurfaceKHR::from_raw(state.create("surface")))
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.driver.0.borrow().drawable
    }
}
