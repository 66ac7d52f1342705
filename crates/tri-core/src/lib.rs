// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;

pub use config::{
    AppConfig, ConfigError, PresentModePreference, RenderConfig, ShaderConfig, WindowConfig,
};

/// Installs the process-wide subscriber. Output goes to stderr so validation
/// diagnostics and setup failures land on the same stream.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .try_init();
}
