// SPDX-License-Identifier: CEPL-1.0
//! Immutable application configuration.
//!
//! Everything the renderer needs at construction time lives here and is
//! passed down by reference. The window parameters are fixed and never read
//! from disk; the render and shader sections may be overridden by a TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE: &str = "tri.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("render.frames_in_flight must be at least 1")]
    FramesInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox, // low latency, falls back to fifo
    Fifo,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            title: "Vulkan".to_owned(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: usize,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModePreference,
    /// Validation layers + debug messenger. Decided at compile time.
    #[serde(skip, default = "default_validation")]
    pub validation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            frames_in_flight: default_frames_in_flight(),
            clear_color: default_clear(),
            present_mode: PresentModePreference::default(),
            validation: default_validation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderConfig {
    #[serde(default = "default_vertex")]
    pub vertex: PathBuf,
    #[serde(default = "default_fragment")]
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        ShaderConfig {
            vertex: default_vertex(),
            fragment: default_fragment(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(skip)]
    pub window: WindowConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub shaders: ShaderConfig,
}

fn default_frames_in_flight() -> usize {
    2
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}
fn default_vertex() -> PathBuf {
    PathBuf::from("vert.spv")
}
fn default_fragment() -> PathBuf {
    PathBuf::from("frag.spv")
}

impl AppConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no {} found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        let cfg = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        cfg.validate()?;
        info!("loaded {}", path.display());
        Ok(cfg)
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.render.frames_in_flight == 0 {
            return Err(ConfigError::FramesInFlight);
        }
        Ok(())
    }
}
