//! 一个用户地址空间的全部状态
//!
//! 由所属 `AddressSpace` 的锁保护; 换出路径在持有页帧表锁的前提下也会获取这把锁。

use super::address::{VirtAddr, VirtPageNum};
use super::mmap::MmapManager;
use super::page::PageKindTag;
use super::page_table::PageTable;
use super::sup_page_table::SupPageTable;

pub struct MemorySet {
    pub page_table: PageTable,
    pub spt: SupPageTable,
    pub mmap_manager: MmapManager,
    /// 陷入时记录的用户栈指针
    pub user_sp: Option<VirtAddr>,
    /// 地址空间已被销毁，不再接受新的页
    pub destroyed: bool,
}

impl MemorySet {
    pub fn new_bare() -> Self {
        Self {
            page_table: PageTable::new(),
            spt: SupPageTable::new(),
            mmap_manager: MmapManager::new(),
            user_sp: None,
            destroyed: false,
        }
    }

    pub fn is_resident(&self, vpn: VirtPageNum) -> bool {
        self.page_table.translate(vpn).is_some()
    }

    /// 该页已经驻留或已有补充页表项
    pub fn is_managed(&self, vpn: VirtPageNum) -> bool {
        self.is_resident(vpn) || self.spt.contains(vpn)
    }

    pub fn page_kind(&self, vpn: VirtPageNum) -> Option<PageKindTag> {
        match self.spt.lookup(vpn) {
            Some(entry) => Some(entry.kind.tag()),
            None if self.is_resident(vpn) => Some(PageKindTag::Anonymous),
            None => None,
        }
    }
}
