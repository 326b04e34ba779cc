mod common;

use std::sync::Arc;

use common::{manager, manager_with, pattern, stack_page};
use kernel_vm::consts::{PAGE_SIZE, USER_TOP};
use kernel_vm::fs::{File, RamFile};
use kernel_vm::mm::VirtAddr;
use kernel_vm::{FaultCause, FaultResolution, MmConfig, PageKindTag, VmError};

#[test]
fn evicted_page_comes_back_from_swap() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    for i in 0..3 {
        space.write_user(stack_page(i), &pattern(i as u8)).unwrap();
    }
    // 两页都被访问过，一整圈之后最老的第 0 页被换出
    assert!(!space.is_resident(stack_page(0)));
    assert_eq!(space.page_kind(stack_page(0)), Some(PageKindTag::Swap));
    assert_eq!(mm.swap_slots_in_use(), 1);

    let mut buf = vec![0; PAGE_SIZE];
    space.read_user(stack_page(0), &mut buf).unwrap();
    assert_eq!(buf, pattern(0));
    assert_eq!(space.page_kind(stack_page(0)), Some(PageKindTag::Anonymous));
    // 第 1 页为此让出了页帧，第 0 页的槽位已经释放
    assert_eq!(space.page_kind(stack_page(1)), Some(PageKindTag::Swap));
    assert_eq!(mm.swap_slots_in_use(), 1);
    assert_eq!(mm.resident_frames(), 2);
}

#[test]
fn clock_evicts_first_clear_entry() {
    let mm = manager(3, 8);
    let space = mm.create_address_space();
    for i in 0..3 {
        space.write_user(stack_page(i), &[i as u8]).unwrap();
    }
    space.clear_accessed(stack_page(0));
    space.clear_accessed(stack_page(1));
    assert!(space.touch(stack_page(2)));

    space.write_user(stack_page(3), &[3]).unwrap();
    assert!(!space.is_resident(stack_page(0)));
    assert!(space.is_resident(stack_page(1)));
    assert!(space.is_resident(stack_page(2)));
    // 扫描在第一项处停下，后面的访问位没有被清除
    assert!(space.is_accessed(stack_page(2)));
    assert_eq!(mm.resident_frames(), 3);
}

#[test]
fn repeated_fault_is_a_no_op() {
    let mm = manager(4, 8);
    let space = mm.create_address_space();
    let va = VirtAddr(USER_TOP - 100);
    assert_eq!(space.handle_fault(va, true, true), Ok(FaultResolution::StackGrown));
    space.write_user(va, b"kept").unwrap();
    assert_eq!(space.handle_fault(va, true, true), Ok(FaultResolution::AlreadyResident));
    assert_eq!(space.handle_fault(va, false, false), Ok(FaultResolution::AlreadyResident));
    assert_eq!(mm.resident_frames(), 1);
    assert_eq!(space.page_kind(va), Some(PageKindTag::Anonymous));
    let mut buf = [0; 4];
    space.read_user(va, &mut buf).unwrap();
    assert_eq!(&buf, b"kept");
}

#[test]
fn stack_grows_up_to_its_limit() {
    let config = MmConfig::default().with_user_frames(8).with_stack_limit(4 * PAGE_SIZE);
    let (mm, _) = manager_with(config, 8);
    let space = mm.create_address_space();
    let bottom = config.stack_bottom();

    assert_eq!(
        space.handle_fault(VirtAddr(bottom), true, true),
        Ok(FaultResolution::StackGrown)
    );
    let below = VirtAddr(bottom - PAGE_SIZE);
    assert_eq!(
        space.handle_fault(below, true, true),
        Err(VmError::InvalidFault(below, FaultCause::Unmapped))
    );
    // 栈指针就在限制之下时，报告为超过栈大小
    space.set_stack_pointer(VirtAddr(bottom - PAGE_SIZE + 16));
    assert_eq!(
        space.handle_fault(below, true, true),
        Err(VmError::InvalidFault(below, FaultCause::StackLimit))
    );
    assert_eq!(mm.resident_frames(), 1);
}

#[test]
fn stack_access_must_be_near_the_stack_pointer() {
    let mm = manager(8, 8);
    let space = mm.create_address_space();
    space.setup_stack().unwrap();
    assert!(space.is_resident(stack_page(0)));

    let sp = USER_TOP - 2 * PAGE_SIZE + 64;
    space.set_stack_pointer(VirtAddr(sp));
    // PUSHA 最多写到栈指针下方 32 字节
    assert!(space.write_user(VirtAddr(sp - 32), &[1]).is_ok());
    let far = VirtAddr(sp - 2 * PAGE_SIZE);
    assert_eq!(
        space.write_user(far, &[1]),
        Err(VmError::InvalidFault(far, FaultCause::Unmapped))
    );
    assert!(space.setup_stack().is_err());
}

#[test]
fn kernel_addresses_never_resolve() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    let va = VirtAddr(USER_TOP);
    assert_eq!(
        space.handle_fault(va, false, false),
        Err(VmError::InvalidFault(va, FaultCause::KernelAddress))
    );
}

#[test]
fn segment_pages_load_lazily_and_zero_fill() {
    let mm = manager(4, 8);
    let space = mm.create_address_space();
    let mut image = pattern(7);
    image.extend_from_slice(&[0xaa; 10]);
    let file = Arc::new(RamFile::read_only("init", image));
    let base = VirtAddr(0x1_0000);
    space
        .load_segment(file, 0, base, PAGE_SIZE + 10, PAGE_SIZE - 10, false)
        .unwrap();
    assert_eq!(space.page_kind(base), Some(PageKindTag::File));
    assert_eq!(mm.resident_frames(), 0);

    let mut buf = vec![0; 2 * PAGE_SIZE];
    space.read_user(base, &mut buf).unwrap();
    assert_eq!(&buf[..PAGE_SIZE], &pattern(7)[..]);
    assert_eq!(&buf[PAGE_SIZE..PAGE_SIZE + 10], &[0xaa; 10]);
    assert!(buf[PAGE_SIZE + 10..].iter().all(|&b| b == 0));
    assert_eq!(mm.resident_frames(), 2);

    assert_eq!(
        space.write_user(base, &[1]),
        Err(VmError::InvalidFault(base, FaultCause::WriteToReadOnly))
    );
}

#[test]
fn write_to_unloaded_read_only_page_is_rejected() {
    let mm = manager(4, 8);
    let space = mm.create_address_space();
    let file = Arc::new(RamFile::read_only("ro", vec![1; PAGE_SIZE]));
    let va = VirtAddr(0x2_0000);
    space.register_file_backed(va, file, 0, PAGE_SIZE, 0, false).unwrap();
    assert_eq!(
        space.handle_fault(va, true, true),
        Err(VmError::InvalidFault(va, FaultCause::WriteToReadOnly))
    );
    assert_eq!(mm.resident_frames(), 0);
}

#[test]
fn short_file_read_releases_the_frame() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    let file = Arc::new(RamFile::new("exe", vec![7; PAGE_SIZE]));
    file.truncate_io_after(100);
    let va = VirtAddr(0x3_0000);
    space.register_file_backed(va, file, 0, PAGE_SIZE, 0, true).unwrap();

    let err = space.handle_fault(va, false, true).unwrap_err();
    assert!(matches!(err, VmError::BackingStoreIo { expected: PAGE_SIZE, actual: 100, .. }));
    assert_eq!(mm.resident_frames(), 0);
    assert_eq!(mm.free_frames(), 2);
    assert_eq!(space.page_kind(va), Some(PageKindTag::File));
}

#[test]
fn duplicate_registration_is_rejected() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    let file: Arc<dyn File> = Arc::new(RamFile::new("a", vec![0; PAGE_SIZE]));
    let va = VirtAddr(0x4_0000);
    space.register_file_backed(va, file.clone(), 0, PAGE_SIZE, 0, true).unwrap();
    assert_eq!(
        space.register_file_backed(va, file.clone(), 0, PAGE_SIZE, 0, true),
        Err(VmError::DuplicateMapping(va))
    );
    assert_eq!(space.map(file, va, PAGE_SIZE), Err(VmError::DuplicateMapping(va)));
}

#[test]
fn dirty_segment_page_goes_to_swap_not_to_the_executable() {
    let mm = manager(1, 8);
    let space = mm.create_address_space();
    let file = Arc::new(RamFile::new("data", vec![5; PAGE_SIZE]));
    let va = VirtAddr(0x5_0000);
    space.register_file_backed(va, file.clone(), 0, PAGE_SIZE, 0, true).unwrap();
    space.write_user(va, b"changed").unwrap();

    space.write_user(stack_page(0), &[1]).unwrap();
    assert_eq!(space.page_kind(va), Some(PageKindTag::Swap));

    let mut buf = [0; 7];
    space.read_user(va, &mut buf).unwrap();
    assert_eq!(&buf, b"changed");
    assert_eq!(space.page_kind(va), Some(PageKindTag::File));
    assert!(space.is_dirty(va));
    assert_eq!(file.contents(), vec![5; PAGE_SIZE]);

    // 仍是脏页，再次换出时依然进入交换区
    space.read_user(stack_page(0), &mut [0]).unwrap();
    assert_eq!(space.page_kind(va), Some(PageKindTag::Swap));
}

#[test]
fn clean_segment_page_is_dropped_and_reloaded() {
    let mm = manager(1, 8);
    let space = mm.create_address_space();
    let file = Arc::new(RamFile::new("text", pattern(3)));
    let va = VirtAddr(0x6_0000);
    space.register_file_backed(va, file, 0, PAGE_SIZE, 0, false).unwrap();
    space.read_user(va, &mut [0]).unwrap();
    space.write_user(stack_page(0), &[1]).unwrap();

    assert_eq!(space.page_kind(va), Some(PageKindTag::File));
    assert!(!space.is_resident(va));
    assert_eq!(mm.swap_slots_in_use(), 0);
    let mut buf = vec![0; PAGE_SIZE];
    space.read_user(va, &mut buf).unwrap();
    assert_eq!(buf, pattern(3));
}

#[test]
fn full_swap_degrades_to_out_of_memory() {
    let mm = manager(1, 1);
    let space = mm.create_address_space();
    space.write_user(stack_page(0), &[1]).unwrap();
    space.write_user(stack_page(1), &[2]).unwrap();
    assert_eq!(mm.swap_slots_in_use(), 1);

    assert_eq!(space.write_user(stack_page(2), &[3]), Err(VmError::OutOfMemory));
    assert!(space.is_resident(stack_page(1)));
    let mut buf = [0];
    space.read_user(stack_page(1), &mut buf).unwrap();
    assert_eq!(buf, [2]);
}

#[test]
fn swap_write_failure_leaves_the_victim_resident() {
    let (mm, disk) = manager_with(MmConfig::default().with_user_frames(1), 4);
    let space = mm.create_address_space();
    space.write_user(stack_page(0), &[9]).unwrap();
    disk.set_broken(true);

    let err = space.write_user(stack_page(1), &[1]).unwrap_err();
    assert!(matches!(err, VmError::BackingStoreIo { store: "swap", .. }));
    assert!(space.is_resident(stack_page(0)));
    assert_eq!(space.page_kind(stack_page(0)), Some(PageKindTag::Anonymous));
    assert_eq!(mm.swap_slots_in_use(), 0);

    disk.set_broken(false);
    space.write_user(stack_page(1), &[1]).unwrap();
    let mut buf = [0];
    space.read_user(stack_page(0), &mut buf).unwrap();
    assert_eq!(buf, [9]);
}

#[test]
fn pinned_frames_are_not_evicted() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    let buffer = space.pin_user_buffer(stack_page(1), 2 * PAGE_SIZE, true).unwrap();
    assert_eq!(buffer.len(), 2 * PAGE_SIZE);
    assert_eq!(
        space.handle_fault(stack_page(2), true, true),
        Err(VmError::OutOfMemory)
    );
    drop(buffer);
    assert_eq!(
        space.handle_fault(stack_page(2), true, true),
        Ok(FaultResolution::StackGrown)
    );
}

#[test]
fn kernel_copies_span_pages_and_mark_them_dirty() {
    let mm = manager(4, 8);
    let space = mm.create_address_space();
    let va = VirtAddr(USER_TOP - PAGE_SIZE - 2);
    assert_eq!(space.copy_out(va, b"abcd"), Ok(4));
    assert!(space.is_dirty(va));
    assert!(space.is_dirty(VirtAddr(USER_TOP - PAGE_SIZE)));

    let mut buf = [0; 4];
    assert_eq!(space.copy_in(va, &mut buf), Ok(4));
    assert_eq!(&buf, b"abcd");
    assert_eq!(mm.resident_frames(), 2);
}

#[test]
fn destroy_releases_frames_and_swap_slots() {
    let mm = manager(2, 8);
    {
        let space = mm.create_address_space();
        for i in 0..4 {
            space.write_user(stack_page(i), &[i as u8]).unwrap();
        }
        assert_eq!(mm.resident_frames(), 2);
        assert_eq!(mm.swap_slots_in_use(), 2);
        space.destroy().unwrap();
        assert_eq!(mm.resident_frames(), 0);
        assert_eq!(mm.swap_slots_in_use(), 0);
        assert!(space.handle_fault(stack_page(0), true, true).is_err());
        // 再次销毁 (包括析构时) 没有效果
        space.destroy().unwrap();
    }
    assert_eq!(mm.free_frames(), 2);
}

#[test]
fn dropping_a_space_frees_its_frames() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    space.write_user(stack_page(0), &[1]).unwrap();
    drop(space);
    assert_eq!(mm.resident_frames(), 0);
}

#[test]
fn eviction_crosses_address_spaces() {
    let mm = manager(1, 8);
    let a = mm.create_address_space();
    let b = mm.create_address_space();
    a.write_user(stack_page(0), b"a").unwrap();
    b.write_user(stack_page(0), b"b").unwrap();
    assert!(!a.is_resident(stack_page(0)));
    assert_eq!(a.page_kind(stack_page(0)), Some(PageKindTag::Swap));

    let mut buf = [0];
    a.read_user(stack_page(0), &mut buf).unwrap();
    assert_eq!(&buf, b"a");
    b.read_user(stack_page(0), &mut buf).unwrap();
    assert_eq!(&buf, b"b");
    assert_eq!(mm.resident_frames(), 1);
}

#[test]
fn destroyed_space_keeps_pinned_frames_until_release() {
    let mm = manager(2, 8);
    let a = mm.create_address_space();
    let b = mm.create_address_space();
    a.write_user(stack_page(0), b"live").unwrap();

    let buffer = a.pin_user_buffer(stack_page(0), 4, false).unwrap();
    assert_eq!(a.destroy(), Ok(()));
    assert_eq!(mm.resident_frames(), 0);
    assert_eq!(mm.free_frames(), 1);

    b.write_user(stack_page(0), &[0x22; 4]).unwrap();
    let mut out = [0; 4];
    assert_eq!(buffer.read(&mut out), 0);
    assert_eq!(out, [0; 4]);
    assert_eq!(mm.free_frames(), 0);

    drop(buffer);
    assert_eq!(mm.free_frames(), 1);
    let mut theirs = [0; 4];
    b.read_user(stack_page(0), &mut theirs).unwrap();
    assert_eq!(theirs, [0x22; 4]);
}

#[test]
fn destroyed_space_rejects_new_segments() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    space.destroy().unwrap();
    let file: Arc<dyn File> = Arc::new(RamFile::new("a", vec![0; PAGE_SIZE]));
    let va = VirtAddr(0x4_0000);
    assert!(matches!(
        space.register_file_backed(va, file.clone(), 0, PAGE_SIZE, 0, true),
        Err(VmError::InvalidArgs(_))
    ));
    assert!(matches!(
        space.load_segment(file, 0, va, PAGE_SIZE, PAGE_SIZE, false),
        Err(VmError::InvalidArgs(_))
    ));
    assert_eq!(space.page_kind(va), None);
}

#[test]
fn copies_reaching_past_the_address_space_top_fail_cleanly() {
    let mm = manager(2, 8);
    let space = mm.create_address_space();
    let va = VirtAddr(usize::MAX - 1);
    let fault: Result<(), VmError> = Err(VmError::InvalidFault(va, FaultCause::KernelAddress));
    assert_eq!(space.read_user(va, &mut [0; 4]), fault.clone());
    assert_eq!(space.write_user(va, b"abcd"), fault.clone());
    assert_eq!(space.copy_out(va, b"abcd"), fault.map(|()| 0));
    assert_eq!(mm.free_frames(), 2);
}
