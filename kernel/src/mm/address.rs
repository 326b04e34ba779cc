//! 虚实地址抽象

use crate::consts::PAGE_SIZE;
use core::fmt::Debug;

/// 页内偏移：12bit
pub const IN_PAGE_OFFSET: usize = 0xc;

macro_rules! derive_wrap {
    ($($type_def:item)*) => {
        $(
            #[repr(C)]
            #[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
            $type_def
        )*
    };
}

derive_wrap! {
    pub struct VirtAddr(pub usize);
    /// 用户页帧池中的页帧序号
    pub struct PhysPageNum(pub usize);
    pub struct VirtPageNum(pub usize);
}

macro_rules! gen_usize_conversions {
    ($($addr_type:ident)*) => {
        $(
            impl From<$addr_type> for usize {
                fn from(value: $addr_type) -> Self {
                    value.0
                }
            }

            impl From<usize> for $addr_type {
                fn from(value: usize) -> Self {
                    Self(value)
                }
            }
        )*
    };
}

gen_usize_conversions! {
    VirtAddr
    PhysPageNum
    VirtPageNum
}

impl From<VirtAddr> for VirtPageNum {
    fn from(value: VirtAddr) -> Self {
        assert!(value.is_aligned(), "{:?} is not page aligned", value);
        value.floor()
    }
}

impl From<VirtPageNum> for VirtAddr {
    fn from(value: VirtPageNum) -> Self {
        Self(value.0 << IN_PAGE_OFFSET)
    }
}

impl VirtAddr {
    /// 从虚拟地址计算虚拟页号（下取整）
    pub fn floor(&self) -> VirtPageNum {
        VirtPageNum(self.0 / PAGE_SIZE)
    }
    /// 从虚拟地址计算虚拟页号（上取整）
    pub fn ceil(&self) -> VirtPageNum {
        VirtPageNum((self.0 + PAGE_SIZE - 1) / PAGE_SIZE)
    }
    /// 从虚拟地址获取页内偏移（低12位）
    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }
    /// 判断虚拟地址是否与页面大小对齐
    pub fn is_aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

impl VirtPageNum {
    pub fn base(&self) -> VirtAddr {
        (*self).into()
    }
}

/// 虚拟页号范围，是个左闭右开的区间
#[derive(Copy, Clone, Debug)]
pub struct VPNRange {
    start: VirtPageNum,
    end: VirtPageNum,
}

impl VPNRange {
    pub fn new(start: VirtPageNum, end: VirtPageNum) -> Self {
        assert!(start <= end, "start {:?} > end {:?}!", start, end);
        Self { start, end }
    }

    pub fn from_va(start_va: VirtAddr, end_va: VirtAddr) -> Self {
        let start = start_va.floor();
        let end = end_va.ceil();
        assert!(start <= end, "start {:?} > end {:?}!", start, end);

        Self { start, end }
    }

    pub fn get_start(&self) -> VirtPageNum {
        self.start
    }

    pub fn get_end(&self) -> VirtPageNum {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    pub fn contains(&self, vpn: VirtPageNum) -> bool {
        self.start <= vpn && vpn < self.end
    }
}

impl IntoIterator for VPNRange {
    type Item = VirtPageNum;

    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            next: self.start,
            end: self.end,
        }
    }
}

pub struct IntoIter<T> {
    next: T,
    end: T,
}

impl<T> Iterator for IntoIter<T>
where
    T: PartialEq + Step,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.end {
            None
        } else {
            Some(self.next.step())
        }
    }
}

pub trait Step {
    /// 返回当前值后步进 1
    fn step(&mut self) -> Self;
}

impl Step for VirtPageNum {
    fn step(&mut self) -> Self {
        let current = *self;
        self.0 += 1;

        current
    }
}
