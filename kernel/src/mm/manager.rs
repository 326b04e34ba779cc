use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::{Mutex, MutexGuard};

use super::address::PhysPageNum;
use super::address_space::AddressSpace;
use super::frame_allocator::{FrameData, PhysMemory};
use super::frame_table::{FrameEntry, FrameTable};
use super::swap::SwapStore;
use super::SpaceId;
use crate::config::MmConfig;
use crate::drivers::BlockDevice;
use crate::error::{VmError, VmResult};

/// 内存管理器
///
/// 在内核的整个生命周期内存在，拥有用户页帧池、页帧表和交换区。
/// 其他组件只能通过它 (或由它创建的 `AddressSpace`) 使用这些资源。
pub struct MemoryManager {
    config: MmConfig,
    frames: Mutex<FrameTable>,
    memory: PhysMemory,
    swap: SwapStore,
    next_space: AtomicUsize,
}

impl MemoryManager {
    pub fn new(config: MmConfig, swap_device: Arc<dyn BlockDevice>) -> VmResult<Arc<Self>> {
        if !config.validate() {
            return Err(VmError::InvalidArgs("invalid memory manager configuration"));
        }
        let swap = SwapStore::new(swap_device, config.swap_slots);
        info!(
            "[MemoryManager::new] {} user frames, {} swap slots",
            config.user_frames,
            swap.capacity()
        );
        Ok(Arc::new(Self {
            config,
            frames: Mutex::new(FrameTable::new(config.user_frames)),
            memory: PhysMemory::new(config.user_frames),
            swap,
            next_space: AtomicUsize::new(1),
        }))
    }

    pub fn config(&self) -> &MmConfig {
        &self.config
    }

    pub fn create_address_space(self: &Arc<Self>) -> AddressSpace {
        let id = SpaceId(self.next_space.fetch_add(1, Ordering::Relaxed));
        AddressSpace::new(id, self.clone())
    }

    /// 驻留的用户页帧数
    pub fn resident_frames(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn free_frames(&self) -> usize {
        self.frames.lock().free()
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn swap_slots_in_use(&self) -> usize {
        self.swap.in_use()
    }

    pub(crate) fn lock_frames(&self) -> MutexGuard<'_, FrameTable> {
        self.frames.lock()
    }

    pub(crate) fn memory(&self) -> &PhysMemory {
        &self.memory
    }

    pub(crate) fn swap(&self) -> &SwapStore {
        &self.swap
    }

    /// 从用户页帧池取一个页帧并登记到 `entry` 描述的页
    ///
    /// 池空时换出恰好一个页帧后再试一次，仍失败则为 `OutOfMemory`。
    pub(crate) fn acquire_frame(
        &self,
        frames: &mut FrameTable,
        entry: FrameEntry,
        zero_fill: bool,
    ) -> VmResult<PhysPageNum> {
        if frames.free() == 0 {
            self.evict(frames)?;
        }
        let ppn = frames.alloc(entry).ok_or(VmError::OutOfMemory)?;
        if zero_fill {
            self.memory.zero(ppn);
        }
        Ok(ppn)
    }

    pub(crate) fn release_frame(&self, frames: &mut FrameTable, ppn: PhysPageNum) {
        match frames.retire(ppn) {
            Some(entry) => trace!("[release_frame] {:?} from {:?}", ppn, entry),
            None => debug!("[release_frame] {:?} is pinned, freed on last unpin", ppn),
        }
    }

    /// 页帧内容的副本，读写文件或交换区时不持有页帧锁
    pub(crate) fn snapshot(&self, ppn: PhysPageNum) -> FrameData {
        **self.memory.frame(ppn)
    }
}
