//! 用户栈增长
//!
//! 栈区域为 `[user_top - stack_limit, user_top)`。一个没有补充页表项的缺页地址
//! 落在栈区域内，且不低于陷入时栈指针下方 `stack_slack` 字节，才视为栈访问。

use alloc::sync::Arc;

use super::address::{VirtAddr, VirtPageNum};
use super::address_space::AddressSpace;
use super::frame_table::{FrameEntry, FrameTable};
use super::manager::MemoryManager;
use super::page_table::PTEFlags;
use crate::error::{FaultCause, VmResult};

impl MemoryManager {
    /// 没有栈指针记录时，栈区域内的任何地址都可以增长
    pub(crate) fn check_stack_access(
        &self,
        va: VirtAddr,
        user_sp: Option<VirtAddr>,
    ) -> Result<(), FaultCause> {
        let config = self.config();
        let near_sp = match user_sp {
            Some(sp) => va.0.saturating_add(config.stack_slack) >= sp.0,
            None => true,
        };
        let in_region = va.0 >= config.stack_bottom() && va.0 < config.user_top;
        match (in_region, near_sp) {
            (true, true) => Ok(()),
            // 紧挨着栈指针但超出了最大栈大小
            (false, true) if user_sp.is_some() => Err(FaultCause::StackLimit),
            _ => Err(FaultCause::Unmapped),
        }
    }

    /// 分配一个清零的可写页并映射到 `vpn`
    pub(crate) fn grow_stack(
        &self,
        frames: &mut FrameTable,
        space: &AddressSpace,
        vpn: VirtPageNum,
    ) -> VmResult<()> {
        let entry = FrameEntry::new(space.id(), Arc::downgrade(space.memory_set()), vpn);
        let ppn = self.acquire_frame(frames, entry, true)?;
        space
            .memory_set()
            .lock()
            .page_table
            .map(vpn, ppn, PTEFlags::user(true));
        debug!("[grow_stack] {:?} VPN {:#x} -> {:?}", space.id(), vpn.0, ppn);
        Ok(())
    }
}
