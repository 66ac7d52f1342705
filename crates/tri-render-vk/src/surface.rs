// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::khr::surface;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::debug;

use crate::instance::Instance;

/// Holds the instance alive until the surface is gone.
pub struct Surface {
    _instance: Arc<Instance>,
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(
        instance: &Arc<Instance>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(instance.entry(), instance.handle(), display, window, None)
        }
        .context("create_surface")?;
        let loader = surface::Instance::new(instance.entry(), instance.handle());
        Ok(Surface {
            _instance: Arc::clone(instance),
            loader,
            handle,
        })
    }

    #[inline]
    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn capabilities(&self, phys: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(phys, self.handle)
        }
        .context("get_physical_device_surface_capabilities")
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
        debug!("destroyed surface");
    }
}
