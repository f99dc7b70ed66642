use ash::vk;
use std::ffi::CString;

use crate::driver::{InstanceApi, Loader};

/// Instance type produced by a panel's loader.
pub type PanelInstance<P> = <<P as Panel>::Loader as Loader>::Instance;
/// Device type produced by a panel's instance.
pub type PanelDevice<P> = <PanelInstance<P> as InstanceApi>::Device;

/// The windowing collaborator: owns the window, knows how to reach the driver
/// library and how to turn its window into a presentation surface.
///
/// The orchestrator calls each method once per run, in this order:
/// `load_driver_library`, `required_instance_extensions`, `create_surface`,
/// `drawable_size`. `unload_driver_library` runs during teardown.
pub trait Panel {
    type Loader: Loader;

    fn load_driver_library(&mut self) -> anyhow::Result<Self::Loader>;

    fn unload_driver_library(&mut self);

    fn required_instance_extensions(&self) -> anyhow::Result<Vec<CString>>;

    fn create_surface(
        &mut self,
        instance: &<Self::Loader as Loader>::Instance,
    ) -> anyhow::Result<vk::SurfaceKHR>;

    /// Current drawable size in pixels.
    fn drawable_size(&self) -> (u32, u32);
}
