// src/images/mod.rs
//! Snapshot of the executable images loaded into this process.

use std::fmt;

use serde::Serialize;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(all(unix, not(target_os = "macos")))]
mod elf;

/// Code section of one loaded image, as of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedLibraryRecord {
    pub path: String,
    pub start: usize,
    pub end: usize,
    /// Runtime load address minus link-time address.
    pub slide: isize,
}

impl SharedLibraryRecord {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address < self.end
    }
}

impl fmt::Display for SharedLibraryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#018x}-{:#018x} {:#x} {}",
            self.start, self.end, self.slide, self.path
        )
    }
}

/// Every loaded image whose code section could be located, main executable first.
///
/// Images without a readable header or code section are skipped.
pub fn loaded_modules() -> Vec<SharedLibraryRecord> {
    #[cfg(target_os = "macos")]
    let records = macos::shared_library_addresses();
    #[cfg(all(unix, not(target_os = "macos")))]
    let records = elf::shared_library_addresses();
    #[cfg(not(unix))]
    let records: Vec<SharedLibraryRecord> = Vec::new();

    log::debug!("found {} loaded images", records.len());
    records
}

/// The image whose code section contains `address`.
pub fn module_containing(address: usize) -> Option<SharedLibraryRecord> {
    loaded_modules()
        .into_iter()
        .find(|record| record.contains(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_display() {
        let record = SharedLibraryRecord {
            path: "/usr/lib/libc.so.6".to_string(),
            start: 0x7f00_0000_1000,
            end: 0x7f00_0000_3000,
            slide: 0x7f00_0000_0000,
        };
        assert_eq!(record.len(), 0x2000);
        assert!(record.contains(0x7f00_0000_2fff));
        assert!(record.to_string().ends_with("/usr/lib/libc.so.6"));
    }

    #[test]
    fn this_function_lives_in_a_module() {
        let address = this_function_lives_in_a_module as usize;
        assert!(module_containing(address).is_some());
    }
}
