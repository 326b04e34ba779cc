//! 交换区
//!
//! 块设备被划分为页大小的槽位，每个槽位占 `SECTORS_PER_PAGE` 个扇区。
//! 槽位表不落盘，内核启动时交换区视为全空。

use alloc::{sync::Arc, vec, vec::Vec};
use spin::Mutex;

use crate::consts::{BLOCK_SIZE, PAGE_SIZE, SECTORS_PER_PAGE};
use crate::drivers::BlockDevice;
use crate::error::{VmError, VmResult};

/// 交换区中的槽位号
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapSlot(pub usize);

struct SlotAllocator {
    /// 以后入先出的方式保存空闲槽位
    free: Vec<usize>,
    used: Vec<bool>,
}

pub struct SwapStore {
    device: Arc<dyn BlockDevice>,
    /// 分配与槽位读写都在这把锁下进行
    inner: Mutex<SlotAllocator>,
}

impl SwapStore {
    /// `slots` 超出设备容量的部分被忽略
    pub fn new(device: Arc<dyn BlockDevice>, slots: usize) -> Self {
        let slots = slots.min(device.num_blocks() / SECTORS_PER_PAGE);
        Self {
            device,
            inner: Mutex::new(SlotAllocator {
                free: (0..slots).rev().collect(),
                used: vec![false; slots],
            }),
        }
    }

    pub fn alloc_slot(&self) -> VmResult<SwapSlot> {
        let mut inner = self.inner.lock();
        let idx = inner.free.pop().ok_or(VmError::SwapFull)?;
        inner.used[idx] = true;
        Ok(SwapSlot(idx))
    }

    pub fn free_slot(&self, slot: SwapSlot) {
        let mut inner = self.inner.lock();
        assert!(
            inner.used.get(slot.0).copied().unwrap_or(false),
            "[SwapStore::free_slot] slot {} is not in use",
            slot.0
        );
        inner.used[slot.0] = false;
        inner.free.push(slot.0);
    }

    pub fn write_slot(&self, slot: SwapSlot, page: &[u8]) -> VmResult<()> {
        assert_eq!(page.len(), PAGE_SIZE);
        let inner = self.inner.lock();
        assert!(inner.used[slot.0], "write to free swap slot {}", slot.0);
        for (i, sector) in page.chunks_exact(BLOCK_SIZE).enumerate() {
            self.device
                .write_block(slot.0 * SECTORS_PER_PAGE + i, sector)
                .map_err(|_| VmError::swap_io())?;
        }
        Ok(())
    }

    pub fn read_slot(&self, slot: SwapSlot, page: &mut [u8]) -> VmResult<()> {
        assert_eq!(page.len(), PAGE_SIZE);
        let inner = self.inner.lock();
        assert!(inner.used[slot.0], "read from free swap slot {}", slot.0);
        for (i, sector) in page.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            self.device
                .read_block(slot.0 * SECTORS_PER_PAGE + i, sector)
                .map_err(|_| VmError::swap_io())?;
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().used.len()
    }

    pub fn in_use(&self) -> usize {
        let inner = self.inner.lock();
        inner.used.len() - inner.free.len()
    }
}
