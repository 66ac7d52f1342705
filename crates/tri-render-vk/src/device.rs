// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and the logical device.
//!
//! Selection is split into a query step that fills a [`DeviceCaps`] record and
//! pure predicates over that record, so the policy can be tested without a
//! driver.

use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use tracing::{debug, info};

use crate::error::SetupError;
use crate::instance::{missing_names, Instance};
use crate::surface::Surface;

pub const DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// What one queue family can do, as far as this renderer cares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub graphics: bool,
    pub present: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, graphics first. One queue is created per entry.
    pub fn unique(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(2);
        for idx in [self.graphics, self.present].into_iter().flatten() {
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out
    }
}

/// First graphics-capable family and first present-capable family.
pub fn find_queue_families(families: &[QueueFamilyCaps]) -> QueueFamilyIndices {
    let mut out = QueueFamilyIndices::default();
    for (i, fam) in families.iter().enumerate() {
        let i = i as u32;
        if fam.graphics && out.graphics.is_none() {
            out.graphics = Some(i);
        }
        if fam.present && out.present.is_none() {
            out.present = Some(i);
        }
        if out.is_complete() {
            break;
        }
    }
    out
}

pub fn missing_extensions(available: &[&CStr]) -> Vec<&'static CStr> {
    missing_names(&DEVICE_EXTENSIONS, available)
}

#[derive(Clone, Debug, Default)]
pub struct DeviceCaps {
    pub name: String,
    pub queues: QueueFamilyIndices,
    pub extensions: Vec<CString>,
    pub format_count: usize,
    pub present_mode_count: usize,
}

/// Queues complete, every required extension present and the surface offers
/// at least one format and one present mode.
pub fn is_device_suitable(caps: &DeviceCaps) -> bool {
    if !caps.queues.is_complete() {
        return false;
    }
    let available: Vec<&CStr> = caps.extensions.iter().map(CString::as_c_str).collect();
    if !missing_extensions(&available).is_empty() {
        return false;
    }
    // surface support is only meaningful once the swapchain extension exists
    caps.format_count > 0 && caps.present_mode_count > 0
}

fn query_caps(
    instance: &ash::Instance,
    surface: &Surface,
    phys: vk::PhysicalDevice,
) -> Result<DeviceCaps> {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
    let mut families = Vec::with_capacity(qprops.len());
    for (i, q) in qprops.iter().enumerate() {
        let present = unsafe {
            surface
                .loader()
                .get_physical_device_surface_support(phys, i as u32, surface.handle())
        }
        .context("get_physical_device_surface_support")?;
        families.push(QueueFamilyCaps {
            graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present,
        });
    }

    let ext_props = unsafe { instance.enumerate_device_extension_properties(phys) }
        .context("enumerate_device_extension_properties")?;
    let extensions: Vec<CString> = ext_props
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
        .collect();

    let available: Vec<&CStr> = extensions.iter().map(CString::as_c_str).collect();
    let (format_count, present_mode_count) = if missing_extensions(&available).is_empty() {
        let formats = unsafe {
            surface
                .loader()
                .get_physical_device_surface_formats(phys, surface.handle())
        }
        .context("get_physical_device_surface_formats")?;
        let modes = unsafe {
            surface
                .loader()
                .get_physical_device_surface_present_modes(phys, surface.handle())
        }
        .context("get_physical_device_surface_present_modes")?;
        (formats.len(), modes.len())
    } else {
        (0, 0)
    };

    Ok(DeviceCaps {
        name,
        queues: find_queue_families(&families),
        extensions,
        format_count,
        present_mode_count,
    })
}

/// First physical device that passes [`is_device_suitable`].
pub fn pick_physical_device(
    instance: &Instance,
    surface: &Surface,
) -> Result<(vk::PhysicalDevice, DeviceCaps)> {
    let devices = unsafe { instance.handle().enumerate_physical_devices() }
        .context("enumerate_physical_devices")?;
    if devices.is_empty() {
        return Err(SetupError::NoPhysicalDevice.into());
    }
    for phys in devices {
        let caps = query_caps(instance.handle(), surface, phys)?;
        if is_device_suitable(&caps) {
            info!("Using GPU: {}", caps.name);
            return Ok((phys, caps));
        }
        debug!(queues = ?caps.queues, "skipping {}", caps.name);
    }
    Err(SetupError::NoSuitableDevice(
        DEVICE_EXTENSIONS.iter().map(|e| CString::from(*e)).collect(),
    )
    .into())
}

/// Logical device with its graphics and present queues.
pub struct Device {
    instance: Arc<Instance>,
    handle: ash::Device,
    phys: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl Device {
    pub fn new(instance: &Arc<Instance>, surface: &Surface) -> Result<Self> {
        let (phys, caps) = pick_physical_device(instance, surface)?;
        let (Some(graphics_family), Some(present_family)) =
            (caps.queues.graphics, caps.queues.present)
        else {
            // is_device_suitable checked completeness
            return Err(SetupError::NoSuitableDevice(Vec::new()).into());
        };

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = caps
            .queues
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();
        let device_exts: Vec<*const c_char> =
            DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let handle = unsafe { instance.handle().create_device(phys, &dinfo, None) }
            .context("create_device")?;
        let graphics_queue = unsafe { handle.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { handle.get_device_queue(present_family, 0) };
        debug!(graphics_family, present_family, "logical device created");

        Ok(Device {
            instance: Arc::clone(instance),
            handle,
            phys,
            graphics_family,
            present_family,
            graphics_queue,
            present_queue,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.handle
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn physical(&self) -> vk::PhysicalDevice {
        self.phys
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.handle.device_wait_idle() }.context("device_wait_idle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.handle.destroy_device(None) };
        debug!("destroyed device");
    }
}
