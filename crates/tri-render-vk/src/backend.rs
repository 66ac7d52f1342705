// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};
use tri_core::{PresentModePreference, RenderConfig};
use tri_render::{Acquire, FrameBackend, Present, RenderSize, ShaderSources};

use crate::device::Device;
use crate::frame::{CommandPool, FrameSlot};
use crate::instance::Instance;
use crate::pipeline::{Framebuffers, Pipeline, RenderPass};
use crate::surface::Surface;
use crate::swapchain::Swapchain;

/// Every Vulkan object the triangle needs. Fields drop top to bottom, which
/// is the reverse of creation order.
pub struct VkBackend {
    slots: Vec<FrameSlot>,
    _command_pool: CommandPool,
    framebuffers: Framebuffers,
    pipeline: Pipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Arc<Surface>,
    _instance: Arc<Instance>,

    clear: vk::ClearValue,
    size_hint: RenderSize,
    present_pref: PresentModePreference,
    shaders: ShaderSources,
}

impl VkBackend {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RenderConfig,
        shaders: ShaderSources,
    ) -> Result<Self> {
        let dh: RawDisplayHandle = display.display_handle()?.as_raw();
        let wh: RawWindowHandle = window.window_handle()?.as_raw();

        let instance = Arc::new(Instance::new(dh, cfg.validation)?);
        let surface = Arc::new(Surface::new(&instance, dh, wh)?);
        let device = Arc::new(Device::new(&instance, &surface)?);
        let swapchain = Swapchain::new(&device, &surface, size, cfg.present_mode, None)?;
        let render_pass = RenderPass::new(&device, swapchain.format())?;
        let pipeline = Pipeline::new(&device, &render_pass, &shaders.vertex, &shaders.fragment)?;
        let framebuffers = Framebuffers::new(&device, &render_pass, &swapchain)?;
        let command_pool = CommandPool::new(&device)?;
        let slots = FrameSlot::create_all(&device, &command_pool, cfg.frames_in_flight)?;
        info!("{} frames in flight", slots.len());

        Ok(VkBackend {
            slots,
            _command_pool: command_pool,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            surface,
            _instance: instance,
            clear: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: cfg.clear_color,
                },
            },
            size_hint: size,
            present_pref: cfg.present_mode,
            shaders,
        })
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn slot(&self, slot: usize) -> Result<&FrameSlot> {
        self.slots
            .get(slot)
            .ok_or_else(|| anyhow!("frame slot {slot} out of range ({})", self.slots.len()))
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        // nothing below may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            warn!("device_wait_idle during teardown: {e:#}");
        }
        debug!("tearing down Vulkan backend");
    }
}

impl FrameBackend for VkBackend {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.slot(slot)?.in_flight.wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire> {
        let sem = self.slot(slot)?.image_available.handle();
        self.swapchain.acquire(sem)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.slot(slot)?.in_flight.reset()
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<()> {
        let cmd = self.slot(slot)?.cmd;
        let framebuffer = self
            .framebuffers
            .get(image)
            .ok_or_else(|| anyhow!("no framebuffer for swapchain image {image}"))?;
        let extent = self.swapchain.extent();
        let d = self.device.handle();

        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("reset_command_buffer")?;

            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .context("begin_command_buffer")?;

            let clears = [self.clear];
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.render_pass.handle(),
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            d.cmd_set_scissor(cmd, 0, &[scissor]);

            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd).context("end_command_buffer")?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let s = self.slot(slot)?;
        let waits = [s.image_available.handle()];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signals = [s.render_finished.handle()];
        let cmds = [s.cmd];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: waits.len() as u32,
            p_wait_semaphores: waits.as_ptr(),
            p_wait_dst_stage_mask: stages.as_ptr(),
            command_buffer_count: cmds.len() as u32,
            p_command_buffers: cmds.as_ptr(),
            signal_semaphore_count: signals.len() as u32,
            p_signal_semaphores: signals.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                std::slice::from_ref(&submit),
                s.in_flight.handle(),
            )
        }
        .context("queue_submit")
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<Present> {
        let wait = self.slot(slot)?.render_finished.handle();
        self.swapchain
            .present(self.device.present_queue(), wait, image)
    }

    fn recreate_swapchain(&mut self) -> Result<bool> {
        self.device.wait_idle()?;
        if Swapchain::surface_is_empty(&self.surface, &self.device)? {
            return Ok(false);
        }

        let fresh = Swapchain::new(
            &self.device,
            &self.surface,
            self.size_hint,
            self.present_pref,
            Some(&self.swapchain),
        )?;
        // framebuffers reference the old views
        self.framebuffers.clear();
        self.swapchain = fresh;

        if self.swapchain.format() != self.render_pass.format() {
            warn!(
                "surface format changed to {:?}, rebuilding pipeline",
                self.swapchain.format()
            );
            let render_pass = RenderPass::new(&self.device, self.swapchain.format())?;
            let pipeline = Pipeline::new(
                &self.device,
                &render_pass,
                &self.shaders.vertex,
                &self.shaders.fragment,
            )?;
            self.pipeline = pipeline;
            self.render_pass = render_pass;
        }

        self.framebuffers = Framebuffers::new(&self.device, &self.render_pass, &self.swapchain)?;
        let extent = self.swapchain.extent();
        info!("swapchain recreated ({}x{})", extent.width, extent.height);
        Ok(true)
    }
}
