// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::device::Device;
use crate::sync::{Fence, Semaphore};

pub struct CommandPool {
    device: Arc<Device>,
    handle: vk::CommandPool,
}

impl CommandPool {
    /// Buffers from this pool may be reset individually.
    pub fn new(device: &Arc<Device>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: device.graphics_family(),
            ..Default::default()
        };
        let handle = unsafe { device.handle().create_command_pool(&pool_info, None) }
            .context("create_command_pool")?;
        Ok(CommandPool {
            device: Arc::clone(device),
            handle,
        })
    }

    pub fn allocate(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.handle,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: buffer_count(count)?,
            ..Default::default()
        };
        unsafe { self.device.handle().allocate_command_buffers(&alloc_info) }
            .context("allocate_command_buffers")
    }
}

fn buffer_count(count: usize) -> Result<u32> {
    u32::try_from(count).with_context(|| format!("{count} command buffers do not fit in a u32"))
}

impl Drop for CommandPool {
    // frees every buffer allocated from it
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.handle, None) };
    }
}

/// Per-slot state for one frame in flight. The command buffer belongs to the
/// pool and is freed with it.
pub struct FrameSlot {
    pub cmd: vk::CommandBuffer,
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
}

impl FrameSlot {
    pub fn create_all(device: &Arc<Device>, pool: &CommandPool, count: usize) -> Result<Vec<Self>> {
        let cmds = pool.allocate(count)?;
        let mut slots = Vec::with_capacity(count);
        for cmd in cmds {
            slots.push(FrameSlot {
                cmd,
                image_available: Semaphore::new(device)?,
                render_finished: Semaphore::new(device)?,
                // signaled so the first wait on each slot returns at once
                in_flight: Fence::new(device, true)?,
            });
        }
        Ok(slots)
    }
}
