// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::device::Device;

/// GPU-side ordering signal between queue operations.
pub struct Semaphore {
    device: Arc<Device>,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Self> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let handle = unsafe { device.handle().create_semaphore(&ci, None) }
            .context("create_semaphore")?;
        Ok(Semaphore {
            device: Arc::clone(device),
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_semaphore(self.handle, None) };
    }
}

/// CPU-observable completion signal for a queue submission.
pub struct Fence {
    device: Arc<Device>,
    handle: vk::Fence,
}

impl Fence {
    pub fn new(device: &Arc<Device>, signaled: bool) -> Result<Self> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        let handle =
            unsafe { device.handle().create_fence(&ci, None) }.context("create_fence")?;
        Ok(Fence {
            device: Arc::clone(device),
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.handle], true, timeout_ns)
        }
        .context("wait_for_fences")
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.handle().reset_fences(&[self.handle]) }.context("reset_fences")
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_fence(self.handle, None) };
    }
}
