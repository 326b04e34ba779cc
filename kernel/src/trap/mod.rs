//! 缺页 trap 的处理入口
//!
//! trap 分发把 Load/Store page fault 交给 [`handle_page_fault`]，
//! 由它决定返回用户态继续执行还是以固定的退出码结束进程。

use crate::consts::FATAL_EXIT_STATUS;
use crate::mm::{AddressSpace, FaultResolution, VirtAddr};

/// 一次缺页异常的信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageFault {
    /// stval 中的出错地址
    pub addr: VirtAddr,
    /// StorePageFault
    pub is_write: bool,
    /// 发生在用户态
    pub is_user: bool,
}

impl PageFault {
    pub fn load(addr: usize) -> Self {
        Self {
            addr: addr.into(),
            is_write: false,
            is_user: true,
        }
    }

    pub fn store(addr: usize) -> Self {
        Self {
            addr: addr.into(),
            is_write: true,
            is_user: true,
        }
    }

    /// 内核在系统调用中访问用户内存时发生的缺页
    pub fn in_kernel(mut self) -> Self {
        self.is_user = false;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultOutcome {
    Resolved,
    StackGrown,
    /// 进程应以该退出码结束
    Fatal(i32),
}

pub fn handle_page_fault(space: &AddressSpace, fault: PageFault) -> FaultOutcome {
    match space.handle_fault(fault.addr, fault.is_write, fault.is_user) {
        Ok(FaultResolution::StackGrown) => FaultOutcome::StackGrown,
        Ok(FaultResolution::Loaded) | Ok(FaultResolution::AlreadyResident) => {
            FaultOutcome::Resolved
        }
        Err(err) => {
            warn!(
                "[kernel trap] {:?} page fault at {:?} (write={}, user={}): {}, killed",
                space.id(),
                fault.addr,
                fault.is_write,
                fault.is_user,
                err
            );
            FaultOutcome::Fatal(FATAL_EXIT_STATUS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MmConfig;
    use crate::drivers::RamDisk;
    use crate::mm::MemoryManager;
    use alloc::sync::Arc;

    fn space() -> AddressSpace {
        let mm = MemoryManager::new(MmConfig::default().with_user_frames(4), Arc::new(RamDisk::new(64)))
            .unwrap();
        mm.create_address_space()
    }

    #[test]
    fn stack_fault_grows_then_resolves() {
        let space = space();
        let addr = crate::consts::USER_TOP - 8;
        assert_eq!(handle_page_fault(&space, PageFault::store(addr)), FaultOutcome::StackGrown);
        assert_eq!(handle_page_fault(&space, PageFault::load(addr)), FaultOutcome::Resolved);
    }

    #[test]
    fn unmapped_and_kernel_addresses_are_fatal() {
        let space = space();
        assert_eq!(
            handle_page_fault(&space, PageFault::load(0x1000)),
            FaultOutcome::Fatal(FATAL_EXIT_STATUS)
        );
        assert_eq!(
            handle_page_fault(&space, PageFault::load(crate::consts::USER_TOP).in_kernel()),
            FaultOutcome::Fatal(FATAL_EXIT_STATUS)
        );
    }
}
