//! 补充页表项: 描述一个尚未驻留或有特殊后备的虚拟页

use alloc::sync::Arc;
use core::fmt::{self, Debug, Formatter};

use super::{address::VirtPageNum, swap::SwapSlot, MapId};
use crate::fs::File;

/// 可执行文件中的一段，缺页时从文件读入
#[derive(Clone)]
pub struct FilePage {
    pub file: Arc<dyn File>,
    pub offset: usize,
    pub read_len: usize,
    pub zero_len: usize,
    pub writable: bool,
}

/// 文件映射中的一页，脏页在换出和解除映射时写回文件
#[derive(Clone)]
pub struct MmapPage {
    pub file: Arc<dyn File>,
    pub offset: usize,
    pub read_len: usize,
    pub mapping: MapId,
}

/// 被换出之前页面的持久身份
#[derive(Clone, Debug)]
pub enum Origin {
    File(FilePage),
    Mmap(MmapPage),
}

#[derive(Clone, Debug)]
pub enum PageKind {
    File(FilePage),
    Mmap(MmapPage),
    /// 内容在交换区中; `origin` 为 `None` 的是匿名页 (例如栈)
    Swap {
        slot: SwapSlot,
        writable: bool,
        origin: Option<Origin>,
    },
}

/// 页面类型的简要标签，供调用者观察
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKindTag {
    File,
    Mmap,
    Swap,
    /// 驻留且没有补充页表项的匿名页
    Anonymous,
}

impl PageKind {
    pub fn writable(&self) -> bool {
        match self {
            PageKind::File(page) => page.writable,
            PageKind::Mmap(_) => true,
            PageKind::Swap { writable, .. } => *writable,
        }
    }

    pub fn tag(&self) -> PageKindTag {
        match self {
            PageKind::File(_) => PageKindTag::File,
            PageKind::Mmap(_) => PageKindTag::Mmap,
            PageKind::Swap { .. } => PageKindTag::Swap,
        }
    }
}

impl From<Origin> for PageKind {
    fn from(origin: Origin) -> Self {
        match origin {
            Origin::File(page) => PageKind::File(page),
            Origin::Mmap(page) => PageKind::Mmap(page),
        }
    }
}

pub struct SupPageEntry {
    pub vpn: VirtPageNum,
    pub kind: PageKind,
    /// 页面当前是否在某个页帧中
    pub resident: bool,
}

impl SupPageEntry {
    pub fn new(vpn: VirtPageNum, kind: PageKind) -> Self {
        Self {
            vpn,
            kind,
            resident: false,
        }
    }

    /// 把页面的后备改为交换槽位，原来的文件身份作为 origin 保留
    ///
    /// 匿名页没有补充页表项，由调用者新建一个 `origin` 为 `None` 的表项。
    pub fn retag_to_swap(&mut self, slot: SwapSlot, writable: bool) {
        let origin = match &self.kind {
            PageKind::File(page) => Some(Origin::File(page.clone())),
            PageKind::Mmap(page) => Some(Origin::Mmap(page.clone())),
            PageKind::Swap { .. } => panic!("{:?} is already in swap", self.vpn),
        };
        self.kind = PageKind::Swap {
            slot,
            writable,
            origin,
        };
        self.resident = false;
    }
}

impl Debug for FilePage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePage")
            .field("file", &self.file.name())
            .field("offset", &self.offset)
            .field("read_len", &self.read_len)
            .field("zero_len", &self.zero_len)
            .field("writable", &self.writable)
            .finish()
    }
}

impl Debug for MmapPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmapPage")
            .field("file", &self.file.name())
            .field("offset", &self.offset)
            .field("read_len", &self.read_len)
            .field("mapping", &self.mapping)
            .finish()
    }
}

impl Debug for SupPageEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "SupPageEntry:VPN={:#x},{:?},resident={}",
            self.vpn.0,
            self.kind.tag(),
            self.resident
        ))
    }
}
