// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr, CString};

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, info};

use crate::debug::{messenger_create_info, DebugMessenger};
use crate::error::SetupError;

pub const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

const APP_NAME: &CStr = c"Triangle_App_Vulkan";
const ENGINE_NAME: &CStr = c"No Engine";

/// Entries of `required` that do not appear in `available`, in order.
pub fn missing_names<'a>(required: &[&'a CStr], available: &[&CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|want| !available.contains(want))
        .collect()
}

/// Loader entry, instance and (with validation) the debug messenger.
/// Everything else holds an `Arc` to this, so it is destroyed last.
pub struct Instance {
    entry: Entry,
    handle: ash::Instance,
    debug: Option<DebugMessenger>,
}

impl Instance {
    pub fn new(display: RawDisplayHandle, validation: bool) -> Result<Self> {
        let entry = unsafe { Entry::load() }.context("load Vulkan loader")?;

        if validation {
            check_validation_layers(&entry)?;
        }

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display)
                .context("enumerate_required_extensions")?
                .to_vec();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        let layers: Vec<*const c_char> = if validation {
            VALIDATION_LAYERS.iter().map(|l| l.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: APP_NAME.as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: ENGINE_NAME.as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_2,
            ..Default::default()
        };

        // chained so instance creation and destruction are validated as well
        let instance_debug = messenger_create_info();
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_next: if validation {
                (&instance_debug as *const vk::DebugUtilsMessengerCreateInfoEXT).cast::<c_void>()
            } else {
                std::ptr::null()
            },
            p_application_info: &app_info,
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            ..Default::default()
        };

        let handle =
            unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?;

        let mut instance = Instance {
            entry,
            handle,
            debug: None,
        };
        if validation {
            instance.debug = Some(DebugMessenger::new(&instance.entry, &instance.handle)?);
        }
        info!(
            "Vulkan instance ready ({} extensions, validation={})",
            extensions.len(),
            validation
        );
        Ok(instance)
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(dbg) = self.debug.take() {
                dbg.destroy();
            }
            self.handle.destroy_instance(None);
        }
        debug!("destroyed instance");
    }
}

fn check_validation_layers(entry: &Entry) -> Result<()> {
    let props = unsafe { entry.enumerate_instance_layer_properties() }
        .context("enumerate_instance_layer_properties")?;
    let available: Vec<&CStr> = props
        .iter()
        .map(|p| unsafe { CStr::from_ptr(p.layer_name.as_ptr()) })
        .collect();
    let missing = missing_names(&VALIDATION_LAYERS, &available);
    if !missing.is_empty() {
        return Err(SetupError::MissingValidationLayers(
            missing.into_iter().map(CString::from).collect(),
        )
        .into());
    }
    Ok(())
}
