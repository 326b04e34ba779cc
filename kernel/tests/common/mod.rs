#![allow(dead_code)]

use std::sync::Arc;

use kernel_vm::consts::{PAGE_SIZE, SECTORS_PER_PAGE, USER_TOP};
use kernel_vm::drivers::RamDisk;
use kernel_vm::mm::VirtAddr;
use kernel_vm::{MemoryManager, MmConfig};

pub fn manager(frames: usize, slots: usize) -> Arc<MemoryManager> {
    manager_with(MmConfig::default().with_user_frames(frames), slots).0
}

/// 同时返回交换盘，方便测试把它弄坏
pub fn manager_with(config: MmConfig, slots: usize) -> (Arc<MemoryManager>, Arc<RamDisk>) {
    let disk = Arc::new(RamDisk::new(slots * SECTORS_PER_PAGE));
    let mm = MemoryManager::new(config.with_swap_slots(slots), disk.clone()).unwrap();
    (mm, disk)
}

/// 从栈顶往下数第 `i` 页的起始地址
pub fn stack_page(i: usize) -> VirtAddr {
    VirtAddr(USER_TOP - (i + 1) * PAGE_SIZE)
}

pub fn pattern(seed: u8) -> Vec<u8> {
    (0..PAGE_SIZE).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}
