// src/memory/management.rs
use nix::errno::Errno;

use super::os::{self, round_up};
use super::protection::{protection_for, MemoryPermission, PageProtection};
use super::region::Region;
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};

/// Reserves, commits and releases address space directly from the OS.
///
/// No bookkeeping is kept: every returned [`Region`] is owned by the caller,
/// who must pair it with exactly one release. Use [`VirtualMemory::reserve`]
/// for a handle that releases on drop.
///
/// Consecutive calls are not atomic with respect to other threads mapping
/// memory. In particular the prefix/suffix trim in
/// [`reserve_aligned_region`](Self::reserve_aligned_region) may race with a
/// concurrent hinted mapping landing in the freed gap; callers that need
/// otherwise must serialize externally.
#[derive(Debug, Clone)]
pub struct VirtualMemory {
    config: VmConfig,
    page_size: usize,
}

impl Default for VirtualMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMemory {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        VirtualMemory {
            config,
            page_size: os::page_size(),
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn allocate_alignment(&self) -> usize {
        os::allocate_alignment()
    }

    pub fn commit_page_size(&self) -> usize {
        os::commit_page_size()
    }

    /// Allocate with Read/Write does not force physical backing up front.
    pub fn has_lazy_commits(&self) -> bool {
        true
    }

    /// Nothing to flush on these hosts.
    pub fn signal_code_moving_gc(&self) {}

    /// Page-rounded size, or ENOMEM when rounding leaves the address space.
    fn page_round(&self, op: &'static str, size: usize, hint: Option<usize>) -> VmResult<usize> {
        os::checked_round_up(size, self.page_size).ok_or(VmError::Os {
            op,
            address: hint.unwrap_or(0),
            size,
            errno: Errno::ENOMEM,
        })
    }

    fn hint(&self, hint: Option<usize>) -> Option<usize> {
        hint.filter(|_| self.config.honor_hints)
    }

    /// Map `requested` bytes (rounded up to the page size) with `permission`.
    ///
    /// The returned region's size is the allocated size.
    pub fn allocate(
        &self,
        requested: usize,
        permission: MemoryPermission,
        hint: Option<usize>,
    ) -> VmResult<Region> {
        let size = self.page_round("mmap", requested, hint)?;
        let protection = protection_for(permission);
        let base = unsafe { os::map(self.hint(hint), size, protection, 0, &self.config)? };

        Ok(Region::new(base, size))
    }

    /// Claim address space only: no access, no backing store.
    pub fn reserve_region(&self, size: usize, hint: Option<usize>) -> VmResult<Region> {
        let size = self.page_round("mmap", size, hint)?;
        let base = unsafe {
            os::map(
                self.hint(hint),
                size,
                PageProtection::NONE,
                libc::MAP_NORESERVE,
                &self.config,
            )?
        };

        Ok(Region::new(base, size))
    }

    /// Reserve `size` bytes whose base is a multiple of `alignment`.
    ///
    /// Over-reserves by one alignment unit and hands the unaligned head and
    /// the excess tail back to the OS. The returned region has no slack:
    /// its size is `size` rounded up to the allocation granularity.
    ///
    /// # Panics
    /// If `alignment` is not a power-of-two multiple of
    /// [`allocate_alignment`](Self::allocate_alignment), if `size` is zero,
    /// or if `size + alignment` overflows.
    pub fn reserve_aligned_region(
        &self,
        size: usize,
        alignment: usize,
        hint: Option<usize>,
    ) -> VmResult<Region> {
        let granularity = self.allocate_alignment();
        assert!(
            alignment.is_power_of_two() && alignment % granularity == 0,
            "alignment {:#x} is not a power-of-two multiple of {:#x}",
            alignment,
            granularity
        );
        assert!(size > 0, "aligned reservation of zero bytes");
        assert!(
            size <= usize::MAX - alignment - granularity,
            "size {:#x} with alignment {:#x} overflows the address space",
            size,
            alignment
        );

        let hint = hint.map(|h| os::aligned_address(h, alignment));
        let request_size = TrimPlan::request_size(size, alignment, granularity);
        let reserved = self.reserve_region(request_size, hint)?;

        let plan = TrimPlan::new(reserved, size, alignment, granularity);
        log::debug!(
            "aligned reservation {:#x}+{:#x} -> {:#x}+{:#x} (trim head {:#x}, tail {:#x})",
            reserved.base,
            reserved.size,
            plan.aligned.base,
            plan.aligned.size,
            plan.prefix,
            plan.suffix
        );

        if plan.prefix != 0 {
            self.trim(reserved.base, plan.prefix);
        }
        if plan.suffix != 0 {
            self.trim(plan.aligned.end(), plan.suffix);
        }

        Ok(plan.aligned)
    }

    fn trim(&self, address: usize, size: usize) {
        if let Err(err) = unsafe { self.release_partial_region(address, size) } {
            if self.config.fatal_trim_failures {
                panic!("failed to trim aligned reservation: {}", err);
            }
            log::warn!("leaking {:#x} bytes at {:#x}: {}", size, address, err);
        }
    }

    /// Make a reserved range Read+Write (+Execute) by remapping it in place.
    ///
    /// # Safety
    /// `address..address + size` must be page aligned and lie inside a range
    /// obtained from this manager. Whatever was mapped there is discarded.
    pub unsafe fn commit_region(
        &self,
        address: usize,
        size: usize,
        is_executable: bool,
    ) -> VmResult<()> {
        os::map(
            Some(address),
            size,
            PageProtection::for_commit(is_executable),
            libc::MAP_FIXED,
            &self.config,
        )?;
        Ok(())
    }

    /// Drop access and backing for a committed range, keeping it reserved.
    ///
    /// # Safety
    /// Same contract as [`commit_region`](Self::commit_region).
    pub unsafe fn uncommit_region(&self, address: usize, size: usize) -> VmResult<()> {
        os::map(
            Some(address),
            size,
            PageProtection::NONE,
            libc::MAP_FIXED | libc::MAP_NORESERVE,
            &self.config,
        )?;
        Ok(())
    }

    /// Return a whole region to the OS.
    ///
    /// # Safety
    /// The range must have come from this manager and must not be used
    /// afterwards. Releasing twice is undefined.
    pub unsafe fn release_region(&self, address: usize, size: usize) -> VmResult<()> {
        log::debug!("release {:#x}+{:#x}", address, size);
        os::unmap(address, size)
    }

    /// Shrink a still-live reservation from one end.
    ///
    /// # Safety
    /// As for [`release_region`](Self::release_region); the rest of the
    /// reservation stays valid.
    pub unsafe fn release_partial_region(&self, address: usize, size: usize) -> VmResult<()> {
        log::trace!("release partial {:#x}+{:#x}", address, size);
        os::unmap(address, size)
    }
}

/// Arithmetic of an aligned reservation, independent of the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrimPlan {
    pub aligned: Region,
    pub prefix: usize,
    pub suffix: usize,
}

impl TrimPlan {
    pub fn request_size(size: usize, alignment: usize, granularity: usize) -> usize {
        round_up(size + alignment, granularity)
    }

    pub fn new(reserved: Region, size: usize, alignment: usize, granularity: usize) -> Self {
        let aligned_base = round_up(reserved.base, alignment);
        debug_assert!(reserved.base <= aligned_base);

        let prefix = aligned_base - reserved.base;
        let remaining = reserved.size - prefix;
        let aligned_size = round_up(size, granularity);
        debug_assert!(aligned_size <= remaining);

        TrimPlan {
            aligned: Region::new(aligned_base, aligned_size),
            prefix,
            suffix: remaining - aligned_size,
        }
    }
}
