// ── Region options ────────────────────────────────────────────────────────────
//
// Tunables for newly allocated regions.  Read from a JSON file named by
// `SHMEM_DRIVER_CONFIG`; every field has a default so a partial (or absent)
// file is fine.  No `unsafe` — pure safe Rust + serde_json.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the path of the JSON options file.
pub const CONFIG_ENV: &str = "SHMEM_DRIVER_CONFIG";

const DEFAULT_NAME: &str = "shmem-driver";

/// Options applied when a `Memory` allocates a new region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOptions {
    /// Debug name given to the kernel object (memfd / ashmem).  Shows up in
    /// `/proc/<pid>/maps`; ignored on platforms without named regions.
    pub name: String,
    /// Apply `F_SEAL_SHRINK` to memfd regions so a peer cannot truncate the
    /// file under an existing mapping.  Linux only.
    pub seal_shrink: bool,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            seal_shrink: true,
        }
    }
}

impl RegionOptions {
    /// Read options from the JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|source| Error::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| Error::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read options from the file named by `SHMEM_DRIVER_CONFIG`.
    ///
    /// Returns the defaults when the variable is unset.  A variable that
    /// points at a missing or malformed file is an error.
    pub fn from_env() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV).map(PathBuf::from)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
