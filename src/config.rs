// src/config.rs
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{VmError, VmResult};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "VMRESERVE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    // Region tagging
    /// macOS `VM_MAKE_TAG` value, visible in vmmap(1).
    pub tag: u8,
    /// Linux anonymous VMA name, shown as `[anon:<name>]` in /proc/<pid>/maps.
    /// Empty disables naming.
    pub region_name: String,

    // Placement
    pub honor_hints: bool,

    // Trimming policy for aligned reservations
    pub fatal_trim_failures: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            tag: 255,
            region_name: "vmreserve".to_string(),
            honor_hints: true,
            fatal_trim_failures: true,
        }
    }
}

impl VmConfig {
    pub fn load(path: &Path) -> VmResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| VmError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| VmError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `$VMRESERVE_CONFIG` if set, defaults otherwise.
    pub fn from_env() -> VmResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                log::debug!("loading config from {:?}", path);
                Self::load(Path::new(&path))
            }
            None => Ok(Self::default()),
        }
    }
}
