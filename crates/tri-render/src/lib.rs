// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tri_core::RenderConfig;

pub mod scheduler;
pub mod shader;

pub use scheduler::{Acquire, FrameBackend, FrameOutcome, FrameScheduler, Present};
pub use shader::{ShaderError, ShaderSources};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RenderConfig,
        shaders: ShaderSources,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Runs one iteration of the present loop.
    fn render(&mut self) -> Result<FrameOutcome>;

    /// Blocks until every submitted frame has finished on the GPU.
    fn wait_idle(&self) -> Result<()>;
}
