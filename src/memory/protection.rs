// src/memory/protection.rs
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Page protection, bit-compatible with the host's `PROT_*` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageProtection: i32 {
        const READ  = libc::PROT_READ;
        const WRITE = libc::PROT_WRITE;
        const EXEC  = libc::PROT_EXEC;
    }
}

impl PageProtection {
    pub const NONE: PageProtection = PageProtection::empty();

    /// Protection used when committing a reserved range.
    pub fn for_commit(is_executable: bool) -> Self {
        if is_executable {
            PageProtection::READ | PageProtection::WRITE | PageProtection::EXEC
        } else {
            PageProtection::READ | PageProtection::WRITE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryPermission {
    NoAccess,
    Read,
    ReadWrite,
    ReadExecute,
    ReadWriteExecute,
    /// Identical to `ReadWriteExecute` on these hosts.
    ReadWriteExecuteForJit,
}

pub fn protection_for(permission: MemoryPermission) -> PageProtection {
    match permission {
        MemoryPermission::NoAccess => PageProtection::NONE,
        MemoryPermission::Read => PageProtection::READ,
        MemoryPermission::ReadWrite => PageProtection::READ | PageProtection::WRITE,
        MemoryPermission::ReadExecute => PageProtection::READ | PageProtection::EXEC,
        MemoryPermission::ReadWriteExecute | MemoryPermission::ReadWriteExecuteForJit => {
            PageProtection::READ | PageProtection::WRITE | PageProtection::EXEC
        }
    }
}

impl From<MemoryPermission> for PageProtection {
    fn from(permission: MemoryPermission) -> Self {
        protection_for(permission)
    }
}
