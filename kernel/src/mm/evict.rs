//! 页帧换出
//!
//! 先把页面内容写到它的后备 (文件或交换区)，写成功后才解除映射。
//! 写失败时页面保持驻留，页表、补充页表和页帧表都不变。

use super::address::{PhysPageNum, VirtPageNum};
use super::frame_table::FrameTable;
use super::manager::MemoryManager;
use super::memory_set::MemorySet;
use super::page::{MmapPage, PageKind, SupPageEntry};
use super::swap::SwapSlot;
use crate::error::{VmError, VmResult};

impl MemoryManager {
    /// 用时钟算法选出一个页帧，保存其内容后还给空闲池
    ///
    /// 调用者持有页帧表锁，且不持有任何地址空间的锁。
    pub(crate) fn evict(&self, frames: &mut FrameTable) -> VmResult<()> {
        let victim = frames
            .select_victim(|_, entry| match entry.space.upgrade() {
                Some(space) => {
                    let mut memory_set = space.lock();
                    memory_set
                        .page_table
                        .test_and_clear_accessed(entry.vpn)
                        .unwrap_or(false)
                }
                // 地址空间已经不存在，内容无需保存
                None => false,
            })
            .ok_or(VmError::OutOfMemory)?;

        let (vpn, space) = match frames.get(victim) {
            Some(entry) => (entry.vpn, entry.space.upgrade()),
            None => return Err(VmError::OutOfMemory),
        };
        if let Some(space) = space {
            let mut memory_set = space.lock();
            match self.save_victim(&mut memory_set, vpn, victim) {
                Ok(()) => {}
                Err(VmError::SwapFull) => {
                    warn!("[evict] swap is full, {:?} stays resident", vpn);
                    return Err(VmError::OutOfMemory);
                }
                Err(err) => return Err(err),
            }
        }
        debug!("[evict] {:?} (VPN {:#x})", victim, vpn.0);
        self.release_frame(frames, victim);
        Ok(())
    }

    /// 按页面类型保存内容并解除映射
    fn save_victim(
        &self,
        memory_set: &mut MemorySet,
        vpn: VirtPageNum,
        ppn: PhysPageNum,
    ) -> VmResult<()> {
        let Some(pte) = memory_set.page_table.translate(vpn) else {
            // 页帧表与页表不一致时只回收页帧
            error!("[save_victim] {:?} owns {:?} but is not mapped", vpn, ppn);
            return Ok(());
        };
        match memory_set.spt.lookup_mut(vpn) {
            Some(entry) => match &entry.kind {
                PageKind::Mmap(page) => {
                    if pte.dirty() {
                        self.write_back(page, ppn)?;
                    }
                    entry.resident = false;
                }
                PageKind::File(page) => {
                    let writable = page.writable;
                    if pte.dirty() {
                        let slot = self.swap_out(ppn)?;
                        entry.retag_to_swap(slot, writable);
                    } else {
                        entry.resident = false;
                    }
                }
                PageKind::Swap { .. } => {
                    panic!("[save_victim] resident {:?} is tagged as swap", vpn)
                }
            },
            None => {
                let slot = self.swap_out(ppn)?;
                memory_set.spt.insert(SupPageEntry::new(
                    vpn,
                    PageKind::Swap {
                        slot,
                        writable: pte.writable(),
                        origin: None,
                    },
                ))?;
            }
        }
        memory_set.page_table.unmap(vpn);
        Ok(())
    }

    /// 把页帧内容写入一个新的交换槽位
    pub(crate) fn swap_out(&self, ppn: PhysPageNum) -> VmResult<SwapSlot> {
        let slot = self.swap().alloc_slot()?;
        let data = self.snapshot(ppn);
        if let Err(err) = self.swap().write_slot(slot, &data) {
            self.swap().free_slot(slot);
            return Err(err);
        }
        trace!("[swap_out] {:?} -> {:?}", ppn, slot);
        Ok(slot)
    }

    /// 把映射页的有效部分写回文件
    pub(crate) fn write_back(&self, page: &MmapPage, ppn: PhysPageNum) -> VmResult<()> {
        let data = self.snapshot(ppn);
        write_file(page, &data)
    }
}

fn write_file(page: &MmapPage, data: &[u8]) -> VmResult<()> {
    let written = page.file.write_at(page.offset, &data[..page.read_len]);
    if written != page.read_len {
        return Err(VmError::short_file(page.read_len, written));
    }
    Ok(())
}
