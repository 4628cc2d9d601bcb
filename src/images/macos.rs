// src/images/macos.rs
use std::ffi::{c_char, CStr, CString};

use goblin::mach::constants::{SECT_TEXT, SEG_TEXT};

use super::SharedLibraryRecord;

extern "C" {
    // <mach-o/getsect.h>
    fn getsectdatafromheader_64(
        mhp: *const libc::mach_header_64,
        segname: *const c_char,
        sectname: *const c_char,
        size: *mut u64,
    ) -> *mut c_char;
}

pub(super) fn shared_library_addresses() -> Vec<SharedLibraryRecord> {
    let (Ok(segment), Ok(section)) = (CString::new(SEG_TEXT), CString::new(SECT_TEXT)) else {
        return Vec::new();
    };

    let count = unsafe { libc::_dyld_image_count() };
    let mut records = Vec::with_capacity(count as usize);

    for index in 0..count {
        let header = unsafe { libc::_dyld_get_image_header(index) };
        if header.is_null() {
            continue;
        }

        let mut size: u64 = 0;
        let code = unsafe {
            getsectdatafromheader_64(
                header as *const libc::mach_header_64,
                segment.as_ptr(),
                section.as_ptr(),
                &mut size,
            )
        };
        if code.is_null() {
            continue;
        }

        let slide = unsafe { libc::_dyld_get_image_vmaddr_slide(index) };
        let start = (code as usize).wrapping_add(slide as usize);
        let name = unsafe { libc::_dyld_get_image_name(index) };
        let path = if name.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
        };

        records.push(SharedLibraryRecord {
            path,
            start,
            end: start.wrapping_add(size as usize),
            slide: slide as isize,
        });
    }

    records
}
