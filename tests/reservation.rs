use vmreserve::memory::os::round_up;
use vmreserve::{MemoryPermission, PageProtection, VirtualMemory};

#[cfg(target_os = "linux")]
use vmreserve::memory::maps;

const KB: usize = 1024;

#[test]
fn allocate_rounds_to_pages() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();

    for requested in [1, page - 1, page, page + 1, 3 * page + 17] {
        let region = vm.allocate(requested, MemoryPermission::ReadWrite, None).unwrap();
        assert_eq!(region.base % page, 0);
        assert!(region.size >= requested);
        assert_eq!(region.size, round_up(requested, page));

        unsafe {
            region.as_ptr().write_volatile(0x5a);
            region.as_ptr().add(region.size - 1).write_volatile(0x5a);
            vm.release_region(region.base, region.size).unwrap();
        }
    }
}

#[test]
fn aligned_reservation_is_exact() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();

    for alignment in [page, 16 * page, (64 * KB).max(page), 2 * 1024 * KB] {
        for size in [1, page, 5 * page + 3] {
            let region = vm.reserve_aligned_region(size, alignment, None).unwrap();
            assert_eq!(region.base % alignment, 0, "alignment {:#x}", alignment);
            assert_eq!(region.size, round_up(size, page));
            unsafe { vm.release_region(region.base, region.size).unwrap() };
        }
    }
}

#[test]
fn aligned_reservation_64k_single_page() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();
    if page != 4096 {
        return;
    }

    let region = vm.reserve_aligned_region(4096, 65536, None).unwrap();
    assert_eq!(region.base % 65536, 0);
    assert_eq!(region.size, 4096);
    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[test]
fn aligned_reservation_honors_hint_alignment() {
    let vm = VirtualMemory::new();
    let alignment = 1 << 21;
    // Deliberately misaligned hint; the kernel may place the mapping elsewhere.
    let region = vm
        .reserve_aligned_region(vm.page_size(), alignment, Some(0x6000_0000_1234))
        .unwrap();
    assert_eq!(region.base % alignment, 0);
    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[test]
fn first_release_succeeds() {
    let vm = VirtualMemory::new();
    let region = vm.reserve_region(10 * KB, None).unwrap();
    assert_eq!(region.base % vm.page_size(), 0);
    assert!(region.size >= 10 * KB);
    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[test]
fn commit_uncommit_commit() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();
    let region = vm.reserve_aligned_region(4 * page, 16 * page, None).unwrap();

    unsafe {
        vm.commit_region(region.base, region.size, false).unwrap();
        region.as_ptr().write_volatile(1);
        vm.uncommit_region(region.base, region.size).unwrap();
        vm.commit_region(region.base, region.size, false).unwrap();
        // Recommitted anonymous memory starts zeroed.
        assert_eq!(region.as_ptr().read_volatile(), 0);
        vm.release_region(region.base, region.size).unwrap();
    }
}

#[test]
fn partial_release_keeps_the_rest() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();
    let region = vm.allocate(4 * page, MemoryPermission::ReadWrite, None).unwrap();

    unsafe {
        vm.release_partial_region(region.base + 2 * page, 2 * page).unwrap();
        region.as_ptr().add(page).write_volatile(7);
        assert_eq!(region.as_ptr().add(page).read_volatile(), 7);
        vm.release_region(region.base, 2 * page).unwrap();
    }
}

#[test]
fn reservation_handle_lifecycle() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();
    let mut reservation = vm.reserve(8 * page, Some(1 << 20), None).unwrap();
    assert_eq!(reservation.base() % (1 << 20), 0);
    assert_eq!(reservation.len(), 8 * page);

    reservation.commit(page, 2 * page, false).unwrap();
    unsafe {
        let ptr = reservation.as_mut_ptr().add(page);
        ptr.write_volatile(42);
        assert_eq!(ptr.read_volatile(), 42);
    }
    reservation.uncommit(page, 2 * page).unwrap();
    reservation.commit(page, 2 * page, false).unwrap();
    unsafe {
        assert_eq!(reservation.as_mut_ptr().add(page).read_volatile(), 0);
    }

    reservation.shrink_to(3 * page).unwrap();
    assert_eq!(reservation.len(), 3 * page);
    reservation.release().unwrap();
}

#[test]
fn lazy_commits() {
    assert!(VirtualMemory::new().has_lazy_commits());
}

#[cfg(target_os = "linux")]
#[test]
fn rwx_allocation_has_all_access_bits() {
    let vm = VirtualMemory::new();
    let region = vm
        .allocate(vm.page_size(), MemoryPermission::ReadWriteExecute, None)
        .unwrap();

    let mapping = maps::mapping_at(region.base).unwrap().unwrap();
    assert_eq!(
        mapping.protection,
        PageProtection::READ | PageProtection::WRITE | PageProtection::EXEC
    );
    assert!(mapping.private);
    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[cfg(target_os = "linux")]
#[test]
fn reservation_is_inaccessible_until_committed() {
    let vm = VirtualMemory::new();
    let page = vm.page_size();
    let region = vm.reserve_region(2 * page, None).unwrap();

    let reserved = maps::mapping_at(region.base).unwrap().unwrap();
    assert_eq!(reserved.protection, PageProtection::NONE);

    unsafe { vm.commit_region(region.base, page, true).unwrap() };
    let committed = maps::mapping_at(region.base).unwrap().unwrap();
    assert!(committed.protection.contains(PageProtection::EXEC | PageProtection::WRITE));

    unsafe { vm.uncommit_region(region.base, page).unwrap() };
    let uncommitted = maps::mapping_at(region.base).unwrap().unwrap();
    assert_eq!(uncommitted.protection, PageProtection::NONE);

    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[cfg(target_os = "linux")]
#[test]
fn regions_carry_the_configured_name() {
    let vm = VirtualMemory::with_config(vmreserve::VmConfig {
        region_name: "vmreserve-tagged".to_string(),
        ..vmreserve::VmConfig::default()
    });
    let region = vm.reserve_region(vm.page_size(), None).unwrap();
    let mapping = maps::mapping_at(region.base).unwrap().unwrap();

    // Kernels without CONFIG_ANON_VMA_NAME leave anonymous mappings unnamed.
    match mapping.name.as_deref() {
        Some(name) => assert_eq!(name, "[anon:vmreserve-tagged]"),
        None => eprintln!("anonymous VMA naming unsupported, skipping"),
    }
    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[cfg(target_os = "linux")]
#[test]
fn empty_region_name_disables_naming() {
    let vm = VirtualMemory::with_config(vmreserve::VmConfig {
        region_name: String::new(),
        ..vmreserve::VmConfig::default()
    });
    let region = vm.reserve_region(vm.page_size(), None).unwrap();
    let mapping = maps::mapping_at(region.base).unwrap().unwrap();
    assert!(mapping.name.map_or(true, |name| !name.starts_with("[anon:vmreserve")));
    unsafe { vm.release_region(region.base, region.size).unwrap() };
}

#[test]
fn oversized_requests_are_refused() {
    let vm = VirtualMemory::new();
    assert!(vm
        .allocate(usize::MAX - 10, MemoryPermission::ReadWrite, None)
        .is_err());
    assert!(vm.reserve_region(usize::MAX - 10, None).is_err());
}
