// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use tri_core::WindowConfig;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

/// Attributes for the single output window. The size is a physical size so
/// the swapchain extent hint matches it on every scale factor.
pub fn window_attributes(cfg: &WindowConfig) -> WindowAttributes {
    Window::default_attributes()
        .with_title(cfg.title.clone())
        .with_inner_size(PhysicalSize::new(cfg.width, cfg.height))
        .with_resizable(cfg.resizable)
}
