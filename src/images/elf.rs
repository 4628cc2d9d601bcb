// src/images/elf.rs
use std::ffi::{c_char, c_int, c_void, CStr};

use goblin::elf::program_header::{PF_X, PT_LOAD};

use super::SharedLibraryRecord;

pub(super) fn shared_library_addresses() -> Vec<SharedLibraryRecord> {
    let mut records: Vec<SharedLibraryRecord> = Vec::new();
    unsafe {
        libc::dl_iterate_phdr(Some(collect), &mut records as *mut _ as *mut c_void);
    }
    records
}

unsafe extern "C" fn collect(
    info: *mut libc::dl_phdr_info,
    _size: usize,
    data: *mut c_void,
) -> c_int {
    let records = &mut *(data as *mut Vec<SharedLibraryRecord>);
    if let Some(record) = info.as_ref().and_then(|info| record_for(info)) {
        records.push(record);
    }
    // Keep iterating
    0
}

unsafe fn record_for(info: &libc::dl_phdr_info) -> Option<SharedLibraryRecord> {
    if info.dlpi_phdr.is_null() {
        return None;
    }

    let headers = std::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize);
    let text = headers
        .iter()
        .find(|header| header.p_type == PT_LOAD && header.p_flags & PF_X != 0)?;

    let slide = info.dlpi_addr as usize;
    let start = slide.wrapping_add(text.p_vaddr as usize);

    Some(SharedLibraryRecord {
        path: image_path(info.dlpi_name),
        start,
        end: start.wrapping_add(text.p_memsz as usize),
        slide: slide as isize,
    })
}

/// The loader reports the main executable with an empty name.
unsafe fn image_path(name: *const c_char) -> String {
    let name = if name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(name).to_string_lossy().into_owned()
    };

    if !name.is_empty() {
        return name;
    }
    std::env::current_exe()
        .map(|path| path.display().to_string())
        .unwrap_or_default()
}
