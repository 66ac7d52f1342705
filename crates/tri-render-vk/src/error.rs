// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CString;
use thiserror::Error;

/// Setup failures that are decided by this crate rather than by a Vulkan
/// return code. Driver errors travel as `vk::Result` inside `anyhow`.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("validation requested but layers are not available: {0:?}")]
    MissingValidationLayers(Vec<CString>),
    #[error("no Vulkan physical devices found")]
    NoPhysicalDevice,
    #[error("no physical device supports graphics, presentation and {0:?}")]
    NoSuitableDevice(Vec<CString>),
    #[error("surface reports no formats")]
    NoSurfaceFormat,
    #[error("{stage} shader is not valid SPIR-V: {source}")]
    InvalidSpirv {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
}
