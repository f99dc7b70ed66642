//! The graphics driver as seen by the bootstrap core.
//!
//! Signatures speak raw `ash::vk` types; the core sequences calls and never
//! wraps driver data. Methods mirror ash's safety contract: anything that
//! takes a handle is `unsafe` and requires the handle to be live and owned by
//! this instance or device.
//!
//! [`crate::ash_driver`] implements these traits over `ash`. Tests use a
//! scripted driver.

use ash::prelude::VkResult;
use ash::vk;

/// A loaded driver library, before any instance exists.
pub trait Loader {
    type Instance: InstanceApi;

    fn instance_extension_properties(&self) -> VkResult<Vec<vk::ExtensionProperties>>;

    fn instance_layer_properties(&self) -> VkResult<Vec<vk::LayerProperties>>;

    /// # Safety
    /// `info` and everything it points at must be valid for the call.
    unsafe fn create_instance(&self, info: &vk::InstanceCreateInfo) -> VkResult<Self::Instance>;
}

/// Instance-level calls, including the surface and debug-utils extensions.
pub trait InstanceApi {
    type Device: DeviceApi;

    fn handle(&self) -> vk::Instance;

    unsafe fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    unsafe fn physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties;

    unsafe fn physical_device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures;

    unsafe fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    unsafe fn device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>>;

    unsafe fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    unsafe fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    unsafe fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    unsafe fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    unsafe fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT,
    ) -> VkResult<vk::DebugUtilsMessengerEXT>;

    unsafe fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT);

    unsafe fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo,
    ) -> VkResult<Self::Device>;

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR);

    /// # Safety
    /// Every child object must already be destroyed.
    unsafe fn destroy(&self);
}

/// Device-level calls, including the swapchain extension.
pub trait DeviceApi {
    fn handle(&self) -> vk::Device;

    unsafe fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue;

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR,
    ) -> VkResult<vk::SwapchainKHR>;

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;

    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    unsafe fn wait_idle(&self) -> VkResult<()>;

    /// # Safety
    /// Every child object must already be destroyed.
    unsafe fn destroy(&self);
}
