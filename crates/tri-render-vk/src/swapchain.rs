// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info};
use tri_core::PresentModePreference;
use tri_render::{Acquire, Present, RenderSize};

use crate::device::Device;
use crate::error::SetupError;
use crate::surface::Surface;

/// Everything the surface reports for one physical device.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(surface: &Surface, phys: vk::PhysicalDevice) -> Result<Self> {
        let caps = surface.capabilities(phys)?;
        let formats = unsafe {
            surface
                .loader()
                .get_physical_device_surface_formats(phys, surface.handle())
        }
        .context("get_physical_device_surface_formats")?;
        let present_modes = unsafe {
            surface
                .loader()
                .get_physical_device_surface_present_modes(phys, surface.handle())
        }
        .context("get_physical_device_surface_present_modes")?;
        Ok(SwapchainSupport {
            caps,
            formats,
            present_modes,
        })
    }
}

/// `B8G8R8A8_SRGB` with the sRGB non-linear colour space, else the first one.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// The preferred mode when the surface offers it, FIFO otherwise (always supported).
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentModePreference,
) -> vk::PresentModeKHR {
    let want = match pref {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    if modes.contains(&want) {
        want
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum; `max_image_count == 0` means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        count
    } else {
        count.min(caps.max_image_count)
    }
}

pub(crate) fn map_acquire(r: VkResult<(u32, bool)>) -> Result<Acquire> {
    match r {
        Ok((image, suboptimal)) => Ok(Acquire::Ready { image, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
        Err(e) => Err(e).context("acquire_next_image"),
    }
}

pub(crate) fn map_present(r: VkResult<bool>) -> Result<Present> {
    match r {
        Ok(false) => Ok(Present::Ok),
        Ok(true) => Ok(Present::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Present::OutOfDate),
        Err(e) => Err(e).context("queue_present"),
    }
}

/// Swapchain plus one colour view per image.
pub struct Swapchain {
    device: Arc<Device>,
    _surface: Arc<Surface>,
    loader: swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Builds a swapchain for the surface's current state. `old` is handed to
    /// the driver so it can recycle resources; it must still be destroyed by
    /// the caller afterwards.
    pub fn new(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
        want: RenderSize,
        pref: PresentModePreference,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let support = SwapchainSupport::query(surface, device.physical())?;
        let format = choose_surface_format(&support.formats).ok_or(SetupError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&support.present_modes, pref);
        let extent = choose_extent(&support.caps, want);
        let min_image_count = choose_image_count(&support.caps);

        let families = [device.graphics_family(), device.present_family()];
        let (sharing, family_count) = if families[0] != families[1] {
            (vk::SharingMode::CONCURRENT, 2)
        } else {
            (vk::SharingMode::EXCLUSIVE, 0)
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle(),
            min_image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_count,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: support.caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old.map_or(vk::SwapchainKHR::null(), |o| o.handle),
            ..Default::default()
        };

        let loader = swapchain::Device::new(device.instance().handle(), device.handle());
        let handle =
            unsafe { loader.create_swapchain(&swap_info, None) }.context("create_swapchain")?;
        let mut sc = Swapchain {
            device: Arc::clone(device),
            _surface: Arc::clone(surface),
            loader,
            handle,
            images: Vec::new(),
            views: Vec::new(),
            format,
            extent,
        };
        sc.images = unsafe { sc.loader.get_swapchain_images(sc.handle) }
            .context("get_swapchain_images")?;

        // views are pushed one by one so a failure part way drops what exists
        for i in 0..sc.images.len() {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: sc.images[i],
                view_type: vk::ImageViewType::TYPE_2D,
                format: format.format,
                components: vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                },
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { device.handle().create_image_view(&iv_info, None) }
                .context("create_image_view")?;
            sc.views.push(view);
        }

        info!(
            "swapchain ready ({}x{}, {:?}/{:?}, {:?}, {} images)",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            sc.images.len()
        );
        Ok(sc)
    }

    /// True when the surface currently has no area (e.g. minimised).
    pub fn surface_is_empty(surface: &Surface, device: &Device) -> Result<bool> {
        let caps = surface.capabilities(device.physical())?;
        Ok(caps.current_extent.width == 0 || caps.current_extent.height == 0)
    }

    pub fn acquire(&self, signal: vk::Semaphore) -> Result<Acquire> {
        map_acquire(unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, signal, vk::Fence::null())
        })
    }

    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, image: u32) -> Result<Present> {
        let waits = [wait];
        let swapchains = [self.handle];
        let indices = [image];
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: waits.len() as u32,
            p_wait_semaphores: waits.as_ptr(),
            swapchain_count: swapchains.len() as u32,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };
        map_present(unsafe { self.loader.queue_present(queue, &info) })
    }

    #[inline]
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &iv in &self.views {
                self.device.handle().destroy_image_view(iv, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
        debug!("destroyed swapchain ({} views)", self.views.len());
    }
}
