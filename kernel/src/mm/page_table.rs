//! 用户地址空间的页表
//!
//! 只模拟叶子页表项: 安装、查询、清除以及 MMU 维护的访问位 (A) 与脏位 (D)。
//! 页表项的编码与 Sv39 相同:
//!
//! ```text
//!    63        54 53                10 9   8 7 6 5 4 3 2 1 0
//!     +----------+--------------------+-----+-+-+-+-+-+-+-+-+
//!     | reserved |        PPN         | RSW |D|A|G|U|X|W|R|V|
//!     +----------+--------------------+-----+-+-+-+-+-+-+-+-+
//! ```

use alloc::collections::BTreeMap;

use super::address::{PhysPageNum, VirtPageNum};

bitflags! {
    /// PTEFlags 一共 8 bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PTEFlags: u16 {
        /// 如果该位置零，则当前页表项的其他位将失去其应有的意义，访问会引发缺页
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        /// 该页表项指向的物理页在用户态是否可以访问
        const U = 1 << 4;
        const G = 1 << 5;
        /// 自上次清除以来页面被访问过
        const A = 1 << 6;
        /// 自映射以来页面被写过
        const D = 1 << 7;
    }
}

impl PTEFlags {
    /// 用户页的权限位
    pub fn user(writable: bool) -> Self {
        if writable {
            PTEFlags::R | PTEFlags::W | PTEFlags::U
        } else {
            PTEFlags::R | PTEFlags::U
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageTableEntry {
    pub bits: usize,
}

impl PageTableEntry {
    /// 从一个物理页号和标志位生成一个页表项
    pub fn new(ppn: PhysPageNum, flags: PTEFlags) -> Self {
        PageTableEntry {
            bits: ppn.0 << 10 | flags.bits() as usize,
        }
    }

    pub fn ppn(&self) -> PhysPageNum {
        (self.bits >> 10 & ((1_usize << 44) - 1)).into()
    }

    pub fn flags(&self) -> PTEFlags {
        PTEFlags::from_bits_truncate((self.bits & 0xff) as u16)
    }

    pub fn is_valid(&self) -> bool {
        self.flags().contains(PTEFlags::V)
    }

    pub fn writable(&self) -> bool {
        self.flags().contains(PTEFlags::W)
    }

    pub fn is_user(&self) -> bool {
        self.flags().contains(PTEFlags::U)
    }

    pub fn accessed(&self) -> bool {
        self.flags().contains(PTEFlags::A)
    }

    pub fn dirty(&self) -> bool {
        self.flags().contains(PTEFlags::D)
    }

    fn insert_flags(&mut self, flags: PTEFlags) {
        self.bits |= flags.bits() as usize;
    }

    fn remove_flags(&mut self, flags: PTEFlags) {
        self.bits &= !(flags.bits() as usize);
    }
}

#[derive(Debug, Default)]
pub struct PageTable {
    entries: BTreeMap<VirtPageNum, PageTableEntry>,
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建立一个虚拟页号到物理页号的映射
    pub fn map(&mut self, vpn: VirtPageNum, ppn: PhysPageNum, flags: PTEFlags) {
        let old = self
            .entries
            .insert(vpn, PageTableEntry::new(ppn, flags | PTEFlags::V));
        assert!(old.is_none(), "{:?} is mapped before mapping", vpn);
    }

    /// 删除映射，之后对该页的访问会重新引发缺页
    pub fn unmap(&mut self, vpn: VirtPageNum) -> Option<PageTableEntry> {
        self.entries.remove(&vpn)
    }

    pub fn translate(&self, vpn: VirtPageNum) -> Option<PageTableEntry> {
        self.entries.get(&vpn).copied()
    }

    /// MMU 在一次访问中设置 A 位，写访问还会设置 D 位
    pub fn mark_access(&mut self, vpn: VirtPageNum, is_write: bool) {
        if let Some(pte) = self.entries.get_mut(&vpn) {
            pte.insert_flags(PTEFlags::A);
            if is_write {
                pte.insert_flags(PTEFlags::D);
            }
        }
    }

    pub fn set_dirty(&mut self, vpn: VirtPageNum) {
        if let Some(pte) = self.entries.get_mut(&vpn) {
            pte.insert_flags(PTEFlags::D);
        }
    }

    /// 清除 A 位并返回其旧值，页不存在时返回 `None`
    pub fn test_and_clear_accessed(&mut self, vpn: VirtPageNum) -> Option<bool> {
        let pte = self.entries.get_mut(&vpn)?;
        let accessed = pte.accessed();
        pte.remove_flags(PTEFlags::A);
        Some(accessed)
    }

    /// 驻留的页数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VirtPageNum, PageTableEntry)> + '_ {
        self.entries.iter().map(|(vpn, pte)| (*vpn, *pte))
    }
}
