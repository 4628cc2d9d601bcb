// src/memory/os.rs
//! Thin wrappers over the host mapping primitives.
//!
//! Everything here works in page granularity; callers are expected to hand
//! in page-aligned addresses when `MAP_FIXED` is involved.

use std::ffi::{c_int, c_void};
use std::ptr;

use lazy_static::lazy_static;

use super::protection::PageProtection;
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};

lazy_static! {
    static ref PAGE_SIZE: usize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
}

pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Granularity of addresses and sizes handed out by mmap.
pub fn allocate_alignment() -> usize {
    page_size()
}

pub fn commit_page_size() -> usize {
    page_size()
}

/// Round `value` up to a multiple of `multiple`, which must be a power of two.
pub const fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) & !(multiple - 1)
}

/// `round_up`, or `None` when the result does not fit in a `usize`.
pub const fn checked_round_up(value: usize, multiple: usize) -> Option<usize> {
    match value.checked_add(multiple - 1) {
        Some(sum) => Some(sum & !(multiple - 1)),
        None => None,
    }
}

pub const fn round_down(value: usize, multiple: usize) -> usize {
    value & !(multiple - 1)
}

pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    value & (alignment - 1) == 0
}

/// Nearest address at or below `address` that satisfies `alignment`.
pub const fn aligned_address(address: usize, alignment: usize) -> usize {
    round_down(address, alignment)
}

#[cfg(target_os = "macos")]
fn tag_fd(config: &VmConfig) -> c_int {
    // VM_MAKE_TAG
    (config.tag as c_int) << 24
}

#[cfg(not(target_os = "macos"))]
fn tag_fd(_config: &VmConfig) -> c_int {
    -1
}

/// Anonymous private mapping carrying the region tag.
///
/// # Safety
/// With `MAP_FIXED` in `flags` this replaces whatever is mapped at `hint`.
pub(crate) unsafe fn map(
    hint: Option<usize>,
    size: usize,
    protection: PageProtection,
    flags: c_int,
    config: &VmConfig,
) -> VmResult<usize> {
    let addr = hint.map_or(ptr::null_mut(), |h| h as *mut c_void);
    let result = libc::mmap(
        addr,
        size,
        protection.bits(),
        flags | libc::MAP_PRIVATE | libc::MAP_ANON,
        tag_fd(config),
        0,
    );

    if result == libc::MAP_FAILED {
        return Err(VmError::last_os("mmap", addr as usize, size));
    }

    let base = result as usize;
    log::trace!("mmap {:#x}+{:#x} {:?} flags={:#x}", base, size, protection, flags);
    name_region(base, size, config);
    Ok(base)
}

/// # Safety
/// The range must not back any live Rust object.
pub(crate) unsafe fn unmap(address: usize, size: usize) -> VmResult<()> {
    if libc::munmap(address as *mut c_void, size) != 0 {
        return Err(VmError::last_os("munmap", address, size));
    }
    log::trace!("munmap {:#x}+{:#x}", address, size);
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn name_region(base: usize, size: usize, config: &VmConfig) {
    const PR_SET_VMA: c_int = 0x5356_4d41;
    const PR_SET_VMA_ANON_NAME: libc::c_ulong = 0;

    if config.region_name.is_empty() {
        return;
    }
    let Ok(name) = std::ffi::CString::new(config.region_name.as_str()) else {
        return;
    };

    // Kernels without CONFIG_ANON_VMA_NAME reject this; the mapping is still fine.
    let rc = unsafe {
        libc::prctl(
            PR_SET_VMA,
            PR_SET_VMA_ANON_NAME,
            base as libc::c_ulong,
            size as libc::c_ulong,
            name.as_ptr(),
        )
    };
    if rc != 0 {
        log::trace!("PR_SET_VMA_ANON_NAME unavailable: {}", nix::errno::Errno::last());
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn name_region(_base: usize, _size: usize, _config: &VmConfig) {}
