// src/error.rs
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    /// The mapping syscall itself was refused by the OS.
    #[error("{op} of {size:#x} bytes at {address:#x} failed: {errno}")]
    Os {
        op: &'static str,
        address: usize,
        size: usize,
        #[source]
        errno: Errno,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl VmError {
    /// Capture `errno` for a failed OS call.
    pub(crate) fn last_os(op: &'static str, address: usize, size: usize) -> Self {
        VmError::Os {
            op,
            address,
            size,
            errno: Errno::last(),
        }
    }

    pub fn errno(&self) -> Option<Errno> {
        match self {
            VmError::Os { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;
