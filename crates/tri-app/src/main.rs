// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tri_core::{config::CONFIG_FILE, init_tracing, AppConfig};
use tri_render::{FrameOutcome, RenderSize, Renderer, ShaderSources};
use tri_render_vk::VkRenderer;

mod pacing;
use pacing::Pacing;

use tri_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

struct App {
    cfg: AppConfig,
    // consumed when the renderer is built
    shaders: Option<ShaderSources>,

    // renderer is declared first so it is dropped before the window
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    fatal: Option<anyhow::Error>,
    exiting: bool,
    pacing: Pacing,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppConfig, shaders: ShaderSources) -> Self {
        App {
            cfg,
            shaders: Some(shaders),
            renderer: None,
            window: None,
            fatal: None,
            exiting: false,
            pacing: Pacing::default(),
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(tri_platform::window_attributes(&self.cfg.window))
            .context("create_window")?;

        let size = window.inner_size();
        let render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let shaders = self
            .shaders
            .take()
            .context("renderer already initialised")?;

        let renderer = VkRenderer::new(&window, &window, render_size, &self.cfg.render, shaders)?;
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn resume_if_unpaused(&self) {
        if !self.pacing.paused() {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.fatal = Some(e);
        self.shutdown(event_loop);
    }

    /// Waits for the GPU, then tears the renderer down before the window.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(r) = &self.renderer {
            if let Err(e) = r.wait_idle() {
                error!("wait_idle on exit: {e:#}");
            }
        }
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e.context("renderer setup failed"));
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                // also reached while paused when the system asks for a repaint
                match renderer.render() {
                    Ok(outcome) => {
                        if let FrameOutcome::Presented { .. } = outcome {
                            self.frames = self.frames.saturating_add(1);
                        }
                        self.pacing.on_frame(outcome);
                    }
                    Err(e) => self.fail(event_loop, e.context("frame failed")),
                }
            }

            WindowEvent::Resized(size) => {
                self.pacing.on_resized(size.width, size.height);
                self.resume_if_unpaused();
            }

            WindowEvent::Occluded(occluded) => {
                self.pacing.on_occluded(occluded);
                self.resume_if_unpaused();
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.pacing.paused() {
            // nothing to draw into; sleep until the window changes
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

/// Everything that must succeed before a window is shown: the config and
/// both shader blobs.
fn prepare(config_path: &Path) -> Result<(AppConfig, ShaderSources)> {
    let cfg = AppConfig::load(config_path)?;
    let shaders = ShaderSources::from_config(&cfg.shaders)?;
    Ok((cfg, shaders))
}

fn main() -> Result<()> {
    init_tracing();
    let (cfg, shaders) = match prepare(Path::new(CONFIG_FILE)) {
        Ok(v) => v,
        Err(e) => {
            error!("{e:#}");
            return Err(e);
        }
    };

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, shaders);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tri_render::ShaderError;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tri-app-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_config(dir: &Path) -> PathBuf {
        let cfg = dir.join("tri.toml");
        let text = format!(
            "[shaders]\nvertex = {:?}\nfragment = {:?}\n",
            dir.join("vert.spv"),
            dir.join("frag.spv")
        );
        std::fs::write(&cfg, text).unwrap();
        cfg
    }

    #[test]
    fn missing_fragment_shader_fails_before_any_window() {
        let dir = scratch_dir("missing-frag");
        let cfg = write_config(&dir);
        std::fs::write(dir.join("vert.spv"), [0x03, 0x02, 0x23, 0x07]).unwrap();
        let _ = std::fs::remove_file(dir.join("frag.spv"));

        let err = prepare(&cfg).unwrap_err();
        match err.downcast_ref::<ShaderError>() {
            Some(ShaderError::Read { path, .. }) => assert_eq!(path, &dir.join("frag.spv")),
            None => panic!("unexpected error: {err:#}"),
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn prepare_loads_config_and_both_blobs() {
        let dir = scratch_dir("ok");
        let cfg = write_config(&dir);
        std::fs::write(dir.join("vert.spv"), [1u8, 2, 3, 4]).unwrap();
        std::fs::write(dir.join("frag.spv"), [5u8, 6, 7, 8]).unwrap();

        let (config, shaders) = prepare(&cfg).unwrap();
        assert_eq!(config.shaders.vertex, dir.join("vert.spv"));
        assert_eq!(shaders.vertex, vec![1, 2, 3, 4]);
        assert_eq!(shaders.fragment, vec![5, 6, 7, 8]);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn bad_config_fails_before_shaders_are_read() {
        let dir = scratch_dir("bad-config");
        let cfg = dir.join("tri.toml");
        std::fs::write(&cfg, "[render]\nframes_in_flight = 0\n").unwrap();

        let err = prepare(&cfg).unwrap_err();
        assert!(err.downcast_ref::<tri_core::ConfigError>().is_some());
        std::fs::remove_dir_all(dir).ok();
    }
}
