//! 用户页帧池
//!
//! `StackFrameAllocator` 只负责页帧号的分配与回收，页帧中的数据由 `PhysMemory` 保存。

use alloc::{boxed::Box, vec::Vec};
use spin::{Mutex, MutexGuard};

use super::address::PhysPageNum;
use crate::consts::PAGE_SIZE;

pub type FrameData = [u8; PAGE_SIZE];

/// 物理页帧管理器
pub trait FrameAllocator {
    /// 从空闲物理页中分配一个物理页
    fn alloc(&mut self) -> Option<PhysPageNum>;
    /// 回收物理页
    fn dealloc(&mut self, ppn: PhysPageNum);
    /// (已分配, 空闲, 总数)
    fn usage(&self) -> (usize, usize, usize);
}

/// 栈式物理页帧管理器
pub struct StackFrameAllocator {
    /// 空闲内存的起始物理页号
    current: usize,
    /// 管理内存的结束物理页号
    end: usize,
    /// 以后入先出的方式保存被回收的物理页号
    recycled: Vec<usize>,
}

impl StackFrameAllocator {
    /// 管理 `[0, frames)` 这些页帧
    pub fn new(frames: usize) -> Self {
        Self {
            current: 0,
            end: frames,
            recycled: Vec::new(),
        }
    }
}

impl FrameAllocator for StackFrameAllocator {
    fn alloc(&mut self) -> Option<PhysPageNum> {
        // 首先检查栈 recycled 内有没有之前回收的物理页号，如果有的话直接弹出栈顶并返回
        if let Some(ppn) = self.recycled.pop() {
            Some(ppn.into())
        }
        // 空间满返回 None
        else if self.current == self.end {
            None
        }
        // 否则就返回最低的物理页号
        else {
            self.current += 1;
            Some((self.current - 1).into())
        }
    }

    fn dealloc(&mut self, ppn: PhysPageNum) {
        let ppn = ppn.0;
        // 验证物理页号有效性，PPN大于已分配的最高内存或已释放栈中存在这个物理页号
        if ppn >= self.current || self.recycled.iter().any(|&v| v == ppn) {
            panic!(
                "[StackFrameAllocator::dealloc] Frame ppn={:#x} has not been allocated!",
                ppn
            );
        }
        // 回收，压栈
        self.recycled.push(ppn);
    }

    fn usage(&self) -> (usize, usize, usize) {
        let free = self.end - self.current + self.recycled.len();
        (self.end - free, free, self.end)
    }
}

/// 用户页帧池中所有页帧的内容
///
/// 每个页帧各有一把锁，它在锁序中位于页帧表锁、地址空间锁与交换区锁之后。
pub struct PhysMemory {
    frames: Vec<Mutex<Box<FrameData>>>,
}

impl PhysMemory {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames)
                .map(|_| Mutex::new(Box::new([0u8; PAGE_SIZE])))
                .collect(),
        }
    }

    pub fn frame(&self, ppn: PhysPageNum) -> MutexGuard<'_, Box<FrameData>> {
        self.frames[ppn.0].lock()
    }

    pub fn zero(&self, ppn: PhysPageNum) {
        self.frame(ppn).fill(0);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_frames_are_reused_first() {
        let mut allocator = StackFrameAllocator::new(3);
        let a = allocator.alloc().unwrap();
        let b = allocator.alloc().unwrap();
        assert_eq!((a, b), (PhysPageNum(0), PhysPageNum(1)));
        allocator.dealloc(a);
        assert_eq!(allocator.alloc(), Some(a));
        assert_eq!(allocator.alloc(), Some(PhysPageNum(2)));
        assert_eq!(allocator.alloc(), None);
        assert_eq!(allocator.usage(), (3, 0, 3));
    }

    #[test]
    #[should_panic]
    fn double_free_is_detected() {
        let mut allocator = StackFrameAllocator::new(2);
        let a = allocator.alloc().unwrap();
        allocator.dealloc(a);
        allocator.dealloc(a);
    }

    #[test]
    fn zeroing_clears_old_contents() {
        let memory = PhysMemory::new(1);
        memory.frame(PhysPageNum(0))[10] = 0xaa;
        memory.zero(PhysPageNum(0));
        assert!(memory.frame(PhysPageNum(0)).iter().all(|&b| b == 0));
    }
}
