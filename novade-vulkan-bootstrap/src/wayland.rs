//! Wayland panel: presentation surfaces from raw `wl_display`/`wl_surface`
//! pointers through `VK_KHR_wayland_surface`.

use ash::extensions::khr::{Surface, WaylandSurface};
use ash::vk;
use std::ffi::{c_void, CString};
use tracing::{debug, info};

use crate::ash_driver::{AshInstance, AshLoader};
use crate::panel::Panel;

pub struct WaylandPanel {
    display: *mut c_void,
    surface: *mut c_void,
    size: (u32, u32),
}

impl WaylandPanel {
    /// # Safety
    /// `display` and `surface` must be live Wayland objects that outlive the
    /// panel and every Vulkan surface created from it.
    pub unsafe fn new(
        display: *mut c_void,
        surface: *mut c_void,
        size: (u32,
        u32),
    ) -> anyhow::Result<Self> {
        if display.is_null() || surface.is_null() {
            return Err(anyhow::anyhow!("Wayland display or surface pointer is null."));
        }
        Ok(Self { display, surface, size })
    }

    /// Records a new drawable size, e.g. from a configure event.
    pub fn set_drawable_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }
}

impl Panel for WaylandPanel {
    type Loader = AshLoader;

    fn load_driver_library(&mut self) -> anyhow::Result<AshLoader> {
        let loader = unsafe { AshLoader::load()? };
        info!("Vulkan loader library loaded.");
        Ok(loader)
    }

    fn unload_driver_library(&mut self) {
        // The library handle lives in the loader; dropping it unloads.
        debug!("Vulkan loader library released.");
    }

    fn required_instance_extensions(&self) -> anyhow::Result<Vec<CString>> {
        Ok(vec![Surface::name().to_owned(), WaylandSurface::name().to_owned()])
    }

    fn create_surface(&mut self, instance: &AshInstance) -> anyhow::Result<vk::SurfaceKHR> {
        let loader = WaylandSurface::new(instance.entry(), instance.raw());
        let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
            .display(self.display)
            .surface(self.surface);

        let surface = unsafe { loader.create_wayland_surface(&create_info, None)? };
        info!("Vulkan Wayland surface created successfully.");
        Ok(surface)
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.size
    }
}
