//! 页帧表
//!
//! 以页帧号为下标的数组，每个驻留的用户页帧一项，记录它属于哪个地址空间的哪个虚拟页。
//! 另有一个按分配先后排列的队列，供时钟 (second-chance) 置换扫描。
//!
//! 映射被拆除时页帧若仍被钉住，则先与地址空间脱离，等最后一次解除钉住时再回到空闲池，
//! 期间不会分给别的页面。

use alloc::{collections::VecDeque, sync::Weak, vec::Vec};
use core::fmt::{self, Debug, Formatter};
use spin::Mutex;

use super::address::{PhysPageNum, VirtPageNum};
use super::frame_allocator::{FrameAllocator, StackFrameAllocator};
use super::memory_set::MemorySet;
use super::SpaceId;

pub struct FrameEntry {
    pub owner: SpaceId,
    pub space: Weak<Mutex<MemorySet>>,
    pub vpn: VirtPageNum,
    /// 内核正在直接读写该页帧的次数，非零时不可被换出
    pub pin_count: usize,
    /// 页面已被拆除，只等钉住者放手
    pub detached: bool,
}

impl FrameEntry {
    pub fn new(owner: SpaceId, space: Weak<Mutex<MemorySet>>, vpn: VirtPageNum) -> Self {
        Self {
            owner,
            space,
            vpn,
            pin_count: 0,
            detached: false,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    /// 仍映射在 `owner` 的 `vpn` 上
    pub fn maps(&self, owner: SpaceId, vpn: VirtPageNum) -> bool {
        !self.detached && self.owner == owner && self.vpn == vpn
    }
}

impl Debug for FrameEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "FrameEntry:owner={:?},VPN={:#x},pins={},detached={}",
            self.owner, self.vpn.0, self.pin_count, self.detached
        ))
    }
}

pub struct FrameTable {
    allocator: StackFrameAllocator,
    entries: Vec<Option<FrameEntry>>,
    /// 时钟扫描顺序，最老的在队首
    clock: VecDeque<PhysPageNum>,
}

impl FrameTable {
    pub fn new(frames: usize) -> Self {
        Self {
            allocator: StackFrameAllocator::new(frames),
            entries: (0..frames).map(|_| None).collect(),
            clock: VecDeque::with_capacity(frames),
        }
    }

    /// 从空闲池取一个页帧并登记，池空时返回 `None`
    ///
    /// 表项在页帧号返回之前就已登记，扫描永远看不到未登记的页帧。
    pub fn alloc(&mut self, entry: FrameEntry) -> Option<PhysPageNum> {
        let ppn = self.allocator.alloc()?;
        debug_assert!(self.entries[ppn.0].is_none());
        self.entries[ppn.0] = Some(entry);
        self.clock.push_back(ppn);
        Some(ppn)
    }

    /// 删除表项并把页帧还给空闲池
    pub fn release(&mut self, ppn: PhysPageNum) -> FrameEntry {
        let entry = self.entries[ppn.0]
            .take()
            .unwrap_or_else(|| panic!("[FrameTable::release] {:?} is not in use", ppn));
        if let Some(pos) = self.clock.iter().position(|&p| p == ppn) {
            self.clock.remove(pos);
        }
        self.allocator.dealloc(ppn);
        entry
    }

    /// 页面被拆除时回收页帧
    ///
    /// 未被钉住时立即释放并返回表项；被钉住时只移出时钟队列并标记脱离，返回 `None`。
    pub fn retire(&mut self, ppn: PhysPageNum) -> Option<FrameEntry> {
        match self.get_mut(ppn) {
            Some(entry) if entry.is_pinned() => entry.detached = true,
            _ => return Some(self.release(ppn)),
        }
        if let Some(pos) = self.clock.iter().position(|&p| p == ppn) {
            self.clock.remove(pos);
        }
        None
    }

    pub fn get(&self, ppn: PhysPageNum) -> Option<&FrameEntry> {
        self.entries.get(ppn.0).and_then(|entry| entry.as_ref())
    }

    pub fn get_mut(&mut self, ppn: PhysPageNum) -> Option<&mut FrameEntry> {
        self.entries.get_mut(ppn.0).and_then(|entry| entry.as_mut())
    }

    pub fn pin(&mut self, ppn: PhysPageNum) {
        if let Some(entry) = self.get_mut(ppn) {
            entry.pin_count += 1;
        }
    }

    /// 解除一次钉住，脱离的页帧在最后一次解除时释放
    pub fn unpin(&mut self, ppn: PhysPageNum) {
        let finished = match self.get_mut(ppn) {
            Some(entry) => {
                assert!(entry.pin_count > 0, "unpin of unpinned {:?}", ppn);
                entry.pin_count -= 1;
                entry.detached && entry.pin_count == 0
            }
            None => false,
        };
        if finished {
            self.release(ppn);
        }
    }

    /// 时钟置换选择牺牲页帧
    ///
    /// 从最老的页帧开始扫描，`test_and_clear_accessed` 返回该页帧的访问位并将其清零。
    /// 第一个访问位为零的页帧被选中；一整圈都没有则选最老的页帧。被钉住的页帧跳过。
    /// 被选中的页帧移到队尾。所有页帧都被钉住时返回 `None`。
    pub fn select_victim<F>(&mut self, mut test_and_clear_accessed: F) -> Option<PhysPageNum>
    where
        F: FnMut(PhysPageNum, &FrameEntry) -> bool,
    {
        let mut victim = None;
        let mut oldest_unpinned = None;
        for (pos, &ppn) in self.clock.iter().enumerate() {
            let Some(entry) = self.entries[ppn.0].as_ref() else {
                continue;
            };
            if entry.is_pinned() {
                continue;
            }
            if oldest_unpinned.is_none() {
                oldest_unpinned = Some(pos);
            }
            if !test_and_clear_accessed(ppn, entry) {
                victim = Some(pos);
                break;
            }
        }
        let pos = victim.or(oldest_unpinned)?;
        let ppn = self.clock.remove(pos)?;
        self.clock.push_back(ppn);
        Some(ppn)
    }

    /// 驻留页帧数，不含已脱离的页帧
    pub fn len(&self) -> usize {
        self.clock.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clock.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn free(&self) -> usize {
        self.allocator.usage().1
    }

    /// 按扫描顺序列出页帧
    pub fn scan_order(&self) -> impl Iterator<Item = PhysPageNum> + '_ {
        self.clock.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PhysPageNum, &FrameEntry)> + '_ {
        self.clock
            .iter()
            .filter_map(|&ppn| self.entries[ppn.0].as_ref().map(|entry| (ppn, entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn entry(vpn: usize) -> FrameEntry {
        FrameEntry::new(SpaceId(1), Weak::new(), VirtPageNum(vpn))
    }

    fn table_with(n: usize) -> (FrameTable, Vec<PhysPageNum>) {
        let mut table = FrameTable::new(n);
        let frames = (0..n).map(|i| table.alloc(entry(i)).unwrap()).collect();
        (table, frames)
    }

    #[test]
    fn exhausted_pool_returns_none() {
        let (mut table, frames) = table_with(2);
        assert!(table.alloc(entry(9)).is_none());
        assert_eq!(table.len(), 2);
        let released = table.release(frames[0]);
        assert_eq!(released.vpn, VirtPageNum(0));
        assert_eq!(table.free(), 1);
        assert!(table.alloc(entry(9)).is_some());
    }

    #[test]
    fn first_clear_bit_is_the_victim() {
        let (mut table, frames) = table_with(3);
        // 访问位依扫描顺序为 {0, 0, 1}
        let mut bits = vec![false, false, true];
        let victim = table.select_victim(|ppn, _| core::mem::replace(&mut bits[ppn.0], false));
        assert_eq!(victim, Some(frames[0]));
        assert_eq!(bits, [false, false, true]);
        let order: Vec<_> = table.scan_order().collect();
        assert_eq!(order, [frames[1], frames[2], frames[0]]);
    }

    #[test]
    fn set_bits_get_a_second_chance() {
        let (mut table, frames) = table_with(3);
        let mut bits = vec![true, false, true];
        let victim = table.select_victim(|ppn, _| core::mem::replace(&mut bits[ppn.0], false));
        assert_eq!(victim, Some(frames[1]));
        // 经过的页帧访问位被清零，没扫到的保持不变
        assert_eq!(bits, [false, false, true]);
    }

    #[test]
    fn full_pass_forces_the_oldest() {
        let (mut table, frames) = table_with(3);
        let mut bits = vec![true, true, true];
        let victim = table.select_victim(|ppn, _| core::mem::replace(&mut bits[ppn.0], false));
        assert_eq!(victim, Some(frames[0]));
        assert_eq!(bits, [false, false, false]);
    }

    #[test]
    fn pinned_frames_are_skipped() {
        let (mut table, frames) = table_with(2);
        table.pin(frames[0]);
        let victim = table.select_victim(|_, _| false);
        assert_eq!(victim, Some(frames[1]));
        table.pin(frames[1]);
        assert_eq!(table.select_victim(|_, _| false), None);
        table.unpin(frames[0]);
        assert_eq!(table.select_victim(|_, _| true), Some(frames[0]));
    }

    #[test]
    fn pinned_frame_is_freed_by_the_last_unpin() {
        let (mut table, frames) = table_with(2);
        table.pin(frames[0]);
        table.pin(frames[0]);
        assert!(table.retire(frames[0]).is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(table.free(), 0);
        assert!(!table.get(frames[0]).unwrap().maps(SpaceId(1), VirtPageNum(0)));
        // 脱离的页帧不参与扫描
        assert_eq!(table.select_victim(|_, _| false), Some(frames[1]));

        table.unpin(frames[0]);
        assert_eq!(table.free(), 0);
        table.unpin(frames[0]);
        assert!(table.get(frames[0]).is_none());
        assert_eq!(table.free(), 1);
        assert_eq!(table.alloc(entry(7)), Some(frames[0]));
    }

    #[test]
    fn unpinned_frame_is_retired_at_once() {
        let (mut table, frames) = table_with(1);
        let entry = table.retire(frames[0]).unwrap();
        assert_eq!(entry.vpn, VirtPageNum(0));
        assert!(table.is_empty());
        assert_eq!(table.free(), 1);
    }
}
