//! 缺页处理
//!
//! 所有入口都在持有页帧表锁的情况下调用。地址空间的锁只在检查与安装映射时短暂持有，
//! 获取页帧 (可能换出同一地址空间的页) 时不持有。

use alloc::sync::Arc;

use super::address::{PhysPageNum, VirtAddr, VirtPageNum};
use super::address_space::AddressSpace;
use super::frame_table::{FrameEntry, FrameTable};
use super::manager::MemoryManager;
use super::page::PageKind;
use super::page_table::PTEFlags;
use super::swap::SwapSlot;
use crate::consts::PAGE_SIZE;
use crate::error::{FaultCause, VmError, VmResult};
use crate::fs::File;

/// 一次缺页被解决的方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultResolution {
    /// 页面已经驻留 (另一个线程先处理了同一个缺页)
    AlreadyResident,
    /// 从文件或交换区装入
    Loaded,
    /// 分配了新的清零栈页
    StackGrown,
}

impl MemoryManager {
    pub(crate) fn resolve_fault(
        &self,
        frames: &mut FrameTable,
        space: &AddressSpace,
        va: VirtAddr,
        is_write: bool,
    ) -> VmResult<FaultResolution> {
        if va.0 >= self.config().user_top {
            return Err(VmError::InvalidFault(va, FaultCause::KernelAddress));
        }
        let vpn = va.floor();
        let kind = {
            let memory_set = space.memory_set().lock();
            if memory_set.destroyed {
                return Err(VmError::InvalidFault(va, FaultCause::Unmapped));
            }
            if let Some(pte) = memory_set.page_table.translate(vpn) {
                if is_write && !pte.writable() {
                    return Err(VmError::InvalidFault(va, FaultCause::WriteToReadOnly));
                }
                return Ok(FaultResolution::AlreadyResident);
            }
            match memory_set.spt.lookup(vpn) {
                Some(entry) => {
                    if is_write && !entry.kind.writable() {
                        return Err(VmError::InvalidFault(va, FaultCause::WriteToReadOnly));
                    }
                    Some(entry.kind.clone())
                }
                None => {
                    self.check_stack_access(va, memory_set.user_sp)
                        .map_err(|cause| VmError::InvalidFault(va, cause))?;
                    None
                }
            }
        };
        match kind {
            Some(kind) => {
                self.load_page(frames, space, vpn, kind)?;
                Ok(FaultResolution::Loaded)
            }
            None => {
                self.grow_stack(frames, space, vpn)?;
                Ok(FaultResolution::StackGrown)
            }
        }
    }

    /// 为一个有补充页表项的页分配页帧，填入内容并安装映射
    fn load_page(
        &self,
        frames: &mut FrameTable,
        space: &AddressSpace,
        vpn: VirtPageNum,
        kind: PageKind,
    ) -> VmResult<()> {
        let entry = FrameEntry::new(space.id(), Arc::downgrade(space.memory_set()), vpn);
        let ppn = self.acquire_frame(frames, entry, false)?;
        let filled = match &kind {
            PageKind::File(page) => self.fill_from_file(ppn, &page.file, page.offset, page.read_len),
            PageKind::Mmap(page) => self.fill_from_file(ppn, &page.file, page.offset, page.read_len),
            PageKind::Swap { slot, .. } => self.fill_from_swap(ppn, *slot),
        };
        if let Err(err) = filled {
            warn!("[load_page] VPN {:#x}: {}", vpn.0, err);
            self.release_frame(frames, ppn);
            return Err(err);
        }

        let mut memory_set = space.memory_set().lock();
        memory_set
            .page_table
            .map(vpn, ppn, PTEFlags::user(kind.writable()));
        match kind {
            PageKind::File(_) | PageKind::Mmap(_) => {
                if let Some(entry) = memory_set.spt.lookup_mut(vpn) {
                    entry.resident = true;
                }
            }
            PageKind::Swap { slot, origin, .. } => {
                self.swap().free_slot(slot);
                match origin {
                    Some(origin) => {
                        if let Some(entry) = memory_set.spt.lookup_mut(vpn) {
                            entry.kind = origin.into();
                            entry.resident = true;
                        }
                        // 内容已经与文件不同，再次换出时必须写回
                        memory_set.page_table.set_dirty(vpn);
                    }
                    None => {
                        memory_set.spt.remove(vpn);
                    }
                }
            }
        }
        trace!("[load_page] VPN {:#x} -> {:?}", vpn.0, ppn);
        Ok(())
    }

    /// 读入 `read_len` 字节，其余补零
    fn fill_from_file(
        &self,
        ppn: PhysPageNum,
        file: &Arc<dyn File>,
        offset: usize,
        read_len: usize,
    ) -> VmResult<()> {
        let mut frame = self.memory().frame(ppn);
        let read = file.read_at(offset, &mut frame[..read_len]);
        if read != read_len {
            return Err(VmError::short_file(read_len, read));
        }
        frame[read_len..].fill(0);
        Ok(())
    }

    fn fill_from_swap(&self, ppn: PhysPageNum, slot: SwapSlot) -> VmResult<()> {
        let mut data = [0u8; PAGE_SIZE];
        self.swap().read_slot(slot, &mut data)?;
        self.memory().frame(ppn).copy_from_slice(&data);
        Ok(())
    }
}
