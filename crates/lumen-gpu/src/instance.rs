use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::HasRawDisplayHandle;
use std::ffi::CStr;

/// Owns the `ash::Entry` and `ash::Instance`. Surface/swapchain creation is
/// the caller's responsibility (out of scope for the core renderer); this
/// only sets up the instance-level extensions a display handle requires.
pub struct Instance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub validation: bool,
}

impl Instance {
    pub fn new(display_handle: &dyn HasRawDisplayHandle, validation: bool) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|_| GpuError::NoSuitableDevice)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(CStr::from_bytes_with_nul(b"lumen\0").unwrap())
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names =
            ash_window::enumerate_required_extensions(display_handle.raw_display_handle())
                .map_err(|_| GpuError::NoSuitableDevice)?
                .to_vec();

        let mut layer_names = Vec::new();
        if validation {
            extension_names.push(ash::extensions::ext::DebugUtils::name().as_ptr());
            layer_names.push(
                CStr::from_bytes_with_nul(b"VK_LAYER_KHRONOS_validation\0")
                    .unwrap()
                    .as_ptr(),
            );
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    pub fn destroy(&self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}
