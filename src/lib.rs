// src/lib.rs
//! Virtual-memory reservation manager.
//!
//! Reserves, aligns, commits, uncommits and releases address-space regions
//! straight from the OS, and enumerates the executable images loaded into
//! the process.

pub mod config;
pub mod error;
pub mod images;
pub mod memory;

pub use config::VmConfig;
pub use error::{VmError, VmResult};
pub use images::{loaded_modules, SharedLibraryRecord};
pub use memory::{
    protection_for, MemoryPermission, PageProtection, Region, Reservation, VirtualMemory,
};
