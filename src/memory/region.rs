// src/memory/region.rs
use std::fmt;
use std::mem::ManuallyDrop;

use super::management::VirtualMemory;
use super::os::{checked_round_up, is_aligned};
use crate::error::VmResult;

/// A contiguous range of virtual address space.
///
/// Plain value: holding a `Region` does not own the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub base: usize,
    pub size: usize,
}

impl Region {
    pub const fn new(base: usize, size: usize) -> Self {
        Region { base, size }
    }

    pub const fn end(&self) -> usize {
        self.base + self.size
    }

    pub const fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.base as *mut u8
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.base, self.end())
    }
}

impl VirtualMemory {
    /// Reserve an owned, inaccessible range, aligned when `alignment` is given.
    pub fn reserve(
        &self,
        size: usize,
        alignment: Option<usize>,
        hint: Option<usize>,
    ) -> VmResult<Reservation<'_>> {
        let region = match alignment {
            Some(alignment) => self.reserve_aligned_region(size, alignment, hint)?,
            None => self.reserve_region(size, hint)?,
        };

        Ok(Reservation { vm: self, region })
    }
}

/// Owner of a reserved range. Dropping it releases the range.
pub struct Reservation<'vm> {
    vm: &'vm VirtualMemory,
    region: Region,
}

impl<'vm> Reservation<'vm> {
    /// Take ownership of a region previously returned by `vm`.
    ///
    /// # Safety
    /// Nothing else may release `region`.
    pub unsafe fn from_raw(vm: &'vm VirtualMemory, region: Region) -> Self {
        Reservation { vm, region }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn base(&self) -> usize {
        self.region.base
    }

    pub fn len(&self) -> usize {
        self.region.size
    }

    pub fn is_empty(&self) -> bool {
        self.region.size == 0
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    fn check_range(&self, offset: usize, len: usize) {
        let page = self.vm.page_size();
        assert!(
            is_aligned(offset, page) && is_aligned(len, page),
            "range {:#x}+{:#x} is not page aligned",
            offset,
            len
        );
        assert!(
            offset <= self.region.size && len <= self.region.size - offset,
            "range {:#x}+{:#x} outside reservation of {:#x} bytes",
            offset,
            len,
            self.region.size
        );
    }

    /// Make `offset..offset + len` accessible. Previous contents are discarded.
    pub fn commit(&mut self, offset: usize, len: usize, executable: bool) -> VmResult<()> {
        self.check_range(offset, len);
        unsafe { self.vm.commit_region(self.region.base + offset, len, executable) }
    }

    pub fn uncommit(&mut self, offset: usize, len: usize) -> VmResult<()> {
        self.check_range(offset, len);
        unsafe { self.vm.uncommit_region(self.region.base + offset, len) }
    }

    /// Give the tail beyond `new_len` (rounded up to the page size) back to the OS.
    pub fn shrink_to(&mut self, new_len: usize) -> VmResult<()> {
        let new_len = checked_round_up(new_len, self.vm.page_size())
            .filter(|&len| len <= self.region.size)
            .unwrap_or_else(|| panic!("cannot grow a reservation"));

        if new_len == self.region.size {
            return Ok(());
        }
        unsafe {
            self.vm
                .release_partial_region(self.region.base + new_len, self.region.size - new_len)?;
        }
        self.region.size = new_len;
        Ok(())
    }

    pub fn release(self) -> VmResult<()> {
        let this = ManuallyDrop::new(self);
        unsafe { this.vm.release_region(this.region.base, this.region.size) }
    }

    /// Stop managing the range; the caller releases it.
    pub fn into_raw(self) -> Region {
        ManuallyDrop::new(self).region
    }
}

impl fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reservation").field(&self.region).finish()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.region.size == 0 {
            return;
        }
        if let Err(err) = unsafe { self.vm.release_region(self.region.base, self.region.size) } {
            log::error!("failed to release reservation {}: {}", self.region, err);
        }
    }
}
