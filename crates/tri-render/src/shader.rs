// SPDX-License-Identifier: CEPL-1.0
//! Precompiled shader blobs.
//!
//! The bytes are opaque here; the backend decides whether they are valid
//! code when it builds its pipeline.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tri_core::ShaderConfig;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ShaderSources {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl ShaderSources {
    pub fn load(vertex: &Path, fragment: &Path) -> Result<Self, ShaderError> {
        Ok(ShaderSources {
            vertex: read_blob(vertex)?,
            fragment: read_blob(fragment)?,
        })
    }

    pub fn from_config(cfg: &ShaderConfig) -> Result<Self, ShaderError> {
        Self::load(&cfg.vertex, &cfg.fragment)
    }
}

fn read_blob(path: &Path) -> Result<Vec<u8>, ShaderError> {
    let bytes = std::fs::read(path).map_err(|source| ShaderError::Read {
        path: path.to_owned(),
        source,
    })?;
    debug!("read {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}
