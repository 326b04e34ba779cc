use alloc::vec::Vec;

use super::address::{PhysPageNum, VirtPageNum};
use super::address_space::AddressSpace;

/// 被钉住的一页中属于缓冲区的部分
#[derive(Clone, Copy, Debug)]
pub(crate) struct PinnedPage {
    pub vpn: VirtPageNum,
    pub ppn: PhysPageNum,
    pub offset: usize,
    pub len: usize,
}

/// 一段已装入并钉住的用户内存
///
/// 系统调用通过它在内核与用户之间复制数据，复制过程中页帧不会被换出。
/// 映射在钉住期间被拆除时，复制停在第一个已拆除的页之前。析构时解除钉住。
pub struct UserBuffer<'a> {
    space: &'a AddressSpace,
    pages: Vec<PinnedPage>,
    writable: bool,
}

impl<'a> UserBuffer<'a> {
    pub(crate) fn new(space: &'a AddressSpace, pages: Vec<PinnedPage>, writable: bool) -> Self {
        Self {
            space,
            pages,
            writable,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 开头仍映射在本地址空间的页
    fn attached(&self) -> &[PinnedPage] {
        let frames = self.space.manager().lock_frames();
        let count = self
            .pages
            .iter()
            .take_while(|page| {
                frames
                    .get(page.ppn)
                    .map_or(false, |entry| entry.maps(self.space.id(), page.vpn))
            })
            .count();
        &self.pages[..count]
    }

    /// 复制到 `buf`，返回复制的字节数
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let memory = self.space.manager().memory();
        let mut done = 0;
        for page in self.attached() {
            if done >= buf.len() {
                break;
            }
            let len = page.len.min(buf.len() - done);
            let frame = memory.frame(page.ppn);
            buf[done..done + len].copy_from_slice(&frame[page.offset..page.offset + len]);
            done += len;
        }
        done
    }

    /// 从 `data` 复制进来并标记脏页，只读缓冲区返回 0
    pub fn write(&mut self, data: &[u8]) -> usize {
        if !self.writable {
            return 0;
        }
        let memory = self.space.manager().memory();
        let mut done = 0;
        let mut touched = Vec::new();
        for page in self.attached() {
            if done >= data.len() {
                break;
            }
            let len = page.len.min(data.len() - done);
            let mut frame = memory.frame(page.ppn);
            frame[page.offset..page.offset + len].copy_from_slice(&data[done..done + len]);
            touched.push((page.vpn, page.ppn));
            done += len;
        }
        let mut memory_set = self.space.memory_set().lock();
        for (vpn, ppn) in touched {
            // 复制之后才被拆除的页不再标记
            if memory_set.page_table.translate(vpn).map_or(false, |pte| pte.ppn() == ppn) {
                memory_set.page_table.set_dirty(vpn);
            }
        }
        done
    }
}

impl Drop for UserBuffer<'_> {
    fn drop(&mut self) {
        let mut frames = self.space.manager().lock_frames();
        for page in &self.pages {
            // 脱离的页帧也由这里解除钉住，最后一次解除时释放
            let still_ours = frames.get(page.ppn).map_or(false, |entry| {
                entry.owner == self.space.id() && entry.vpn == page.vpn && entry.is_pinned()
            });
            if still_ours {
                frames.unpin(page.ppn);
            }
        }
    }
}
