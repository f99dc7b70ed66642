use ash::extensions::{ext::DebugUtils, khr::Surface, khr::Swapchain};
use ash::prelude::VkResult;
use ash::vk;

use crate::driver::{DeviceApi, InstanceApi, Loader};

/// The system Vulkan loader.
#[derive(Clone)]
pub struct AshLoader {
    entry: ash::Entry,
}

impl AshLoader {
    pub fn new(entry: ash::Entry) -> Self {
        Self { entry }
    }

    /// Loads `libvulkan` from the default search path.
    ///
    /// # Safety
    /// See [`ash::Entry::load`].
    pub unsafe fn load() -> Result<Self, ash::LoadingError> {
        Ok(Self::new(ash::Entry::load()?))
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Loader for AshLoader {
    type Instance = AshInstance;

    #[allow(unused_unsafe)]
    fn instance_extension_properties(&self) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.entry.enumerate_instance_extension_properties(None) }
    }

    #[allow(unused_unsafe)]
    fn instance_layer_properties(&self) -> VkResult<Vec<vk::LayerProperties>> {
        unsafe { self.entry.enumerate_instance_layer_properties() }
    }

    unsafe fn create_instance(&self, info: &vk::InstanceCreateInfo) -> VkResult<AshInstance> {
        let instance = self.entry.create_instance(info, None)?;
        let surface = Surface::new(&self.entry, &instance);
        let debug_utils = DebugUtils::new(&self.entry, &instance);
        Ok(AshInstance {
            entry: self.entry.clone(),
            instance,
            surface,
            debug_utils,
        })
    }
}

/// An `ash::Instance` with the surface and debug-utils loaders attached.
pub struct AshInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    surface: Surface,
    debug_utils: DebugUtils,
}

impl AshInstance {
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }
}

impl InstanceApi for AshInstance {
    type Device = AshDevice;

    fn handle(&self) -> vk::Instance {
        self.instance.handle()
    }

    unsafe fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        self.instance.enumerate_physical_devices()
    }

    unsafe fn physical_device_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        self.instance.get_physical_device_properties(pd)
    }

    unsafe fn physical_device_features(
        &self,
        pd: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        self.instance.get_physical_device_features(pd)
    }

    unsafe fn queue_family_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        self.instance.get_physical_device_queue_family_properties(pd)
    }

    unsafe fn device_extension_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        self.instance.enumerate_device_extension_properties(pd)
    }

    unsafe fn surface_support(
        &self,
        pd: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        self.surface.get_physical_device_surface_support(pd, family, surface)
    }

    unsafe fn surface_capabilities(
        &self,
        pd: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        self.surface.get_physical_device_surface_capabilities(pd, surface)
    }

    unsafe fn surface_formats(
        &self,
        pd: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        self.surface.get_physical_device_surface_formats(pd, surface)
    }

    unsafe fn surface_present_modes(
        &self,
        pd: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        self.surface.get_physical_device_surface_present_modes(pd, surface)
    }

    unsafe fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        self.debug_utils.create_debug_utils_messenger(info, None)
    }

    unsafe fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        self.debug_utils.destroy_debug_utils_messenger(messenger, None);
    }

    unsafe fn create_device(
        &self,
        pd: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo,
    ) -> VkResult<AshDevice> {
        let device = self.instance.create_device(pd, info, None)?;
        let swapchain = Swapchain::new(&self.instance, &device);
        Ok(AshDevice { device, swapchain })
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.surface.destroy_surface(surface, None);
    }

    unsafe fn destroy(&self) {
        self.instance.destroy_instance(None);
    }
}

/// An `ash::Device` with the swapchain loader attached.
pub struct AshDevice {
    device: ash::Device,
    swapchain: Swapchain,
}

impl AshDevice {
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn swapchain_loader(&self) -> &Swapchain {
        &self.swapchain
    }
}

impl DeviceApi for AshDevice {
    fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    unsafe fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        self.device.get_device_queue(family_index, queue_index)
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        self.swapchain.create_swapchain(info, None)
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchain.destroy_swapchain(swapchain, None);
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.swapchain.get_swapchain_images(swapchain)
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.device.create_image_view(info, None)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.device.destroy_image_view(view, None);
    }

    unsafe fn wait_idle(&self) -> VkResult<()> {
        self.device.device_wait_idle()
    }

    unsafe fn destroy(&self) {
        self.device.destroy_device(None);
    }
}
