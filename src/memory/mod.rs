// src/memory/mod.rs
//! Address-space reservation at OS page granularity.

pub mod management;
pub mod maps;
pub mod os;
pub mod protection;
pub mod region;

pub use management::VirtualMemory;
pub use maps::MappingInfo;
pub use protection::{protection_for, MemoryPermission, PageProtection};
pub use region::{Region, Reservation};
