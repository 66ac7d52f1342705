// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;
use tri_core::RenderConfig;
use tri_render::{FrameOutcome, FrameScheduler, RenderSize, Renderer, ShaderSources};

mod backend;
mod debug;
pub mod device;
mod error;
mod frame;
pub mod instance;
mod pipeline;
mod surface;
pub mod swapchain;
mod sync;

pub use backend::VkBackend;
pub use debug::diagnostics_emitted;
pub use error::SetupError;

pub struct VkRenderer {
    scheduler: FrameScheduler,
    backend: VkBackend,
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RenderConfig,
        shaders: ShaderSources,
    ) -> Result<Self> {
        let backend = VkBackend::new(window, display, size, cfg, shaders)?;
        let scheduler = FrameScheduler::for_backend(&backend)?;
        let extent = backend.extent();
        info!(
            "Vulkan renderer ready ({}x{}, validation={})",
            extent.width, extent.height, cfg.validation
        );
        Ok(VkRenderer { scheduler, backend })
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        self.scheduler.draw_frame(&mut self.backend)
    }

    fn wait_idle(&self) -> Result<()> {
        self.backend.device().wait_idle()
    }
}
