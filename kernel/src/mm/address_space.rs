//! 用户地址空间
//!
//! 每个用户进程一个。它是系统调用层、进程加载器和陷入处理使用本子系统的入口。

use alloc::{sync::Arc, vec::Vec};
use spin::Mutex;

use super::address::{VPNRange, VirtAddr, VirtPageNum};
use super::fault::FaultResolution;
use super::frame_table::FrameTable;
use super::manager::MemoryManager;
use super::memory_set::MemorySet;
use super::mmap::MapId;
use super::page::{FilePage, PageKind, PageKindTag};
use super::user_buffer::{PinnedPage, UserBuffer};
use super::SpaceId;
use crate::consts::PAGE_SIZE;
use crate::error::{FaultCause, VmError, VmResult};
use crate::fs::File;

pub struct AddressSpace {
    id: SpaceId,
    mm: Arc<MemoryManager>,
    memory_set: Arc<Mutex<MemorySet>>,
}

impl AddressSpace {
    pub(crate) fn new(id: SpaceId, mm: Arc<MemoryManager>) -> Self {
        Self {
            id,
            mm,
            memory_set: Arc::new(Mutex::new(MemorySet::new_bare())),
        }
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.mm
    }

    pub(crate) fn memory_set(&self) -> &Arc<Mutex<MemorySet>> {
        &self.memory_set
    }

    /// 登记一个惰性装入的可执行文件页
    pub fn register_file_backed(
        &self,
        va: VirtAddr,
        file: Arc<dyn File>,
        offset: usize,
        read_len: usize,
        zero_len: usize,
        writable: bool,
    ) -> VmResult<()> {
        if !va.is_aligned() || read_len + zero_len != PAGE_SIZE {
            return Err(VmError::InvalidArgs(
                "file-backed page must be page aligned and exactly one page long",
            ));
        }
        if va.0 >= self.mm.config().user_top {
            return Err(VmError::InvalidFault(va, FaultCause::KernelAddress));
        }
        let vpn = va.floor();
        let mut memory_set = self.memory_set.lock();
        if memory_set.destroyed {
            return Err(VmError::InvalidArgs("address space is destroyed"));
        }
        if memory_set.is_managed(vpn) {
            return Err(VmError::DuplicateMapping(va));
        }
        memory_set.spt.register_file_backed(
            vpn,
            FilePage {
                file,
                offset,
                read_len,
                zero_len,
                writable,
            },
        )
    }

    /// 把一个可装入的段拆成页，逐页登记
    ///
    /// 每页读入 `min(剩余 read_bytes, PAGE_SIZE)` 字节，其余补零。
    pub fn load_segment(
        &self,
        file: Arc<dyn File>,
        ofs: usize,
        upage: VirtAddr,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> VmResult<()> {
        if !upage.is_aligned() || ofs % PAGE_SIZE != 0 || (read_bytes + zero_bytes) % PAGE_SIZE != 0
        {
            return Err(VmError::InvalidArgs("segment is not page aligned"));
        }
        let mut read_left = read_bytes;
        let mut offset = ofs;
        let pages = (read_bytes + zero_bytes) / PAGE_SIZE;
        for i in 0..pages {
            let read_len = read_left.min(PAGE_SIZE);
            self.register_file_backed(
                VirtAddr(upage.0 + i * PAGE_SIZE),
                file.clone(),
                offset,
                read_len,
                PAGE_SIZE - read_len,
                writable,
            )?;
            read_left -= read_len;
            offset += read_len;
        }
        debug!(
            "[load_segment] {:?} {:?} {} pages from {}",
            self.id,
            upage,
            pages,
            file.name()
        );
        Ok(())
    }

    /// 进程启动时预先映射最高的一页栈
    pub fn setup_stack(&self) -> VmResult<()> {
        let top = self.mm.config().user_top;
        let vpn = VirtAddr(top - PAGE_SIZE).floor();
        let mut frames = self.mm.lock_frames();
        if self.memory_set.lock().is_managed(vpn) {
            return Err(VmError::DuplicateMapping(vpn.base()));
        }
        self.mm.grow_stack(&mut frames, self, vpn)
    }

    /// 陷入时记录用户栈指针，供栈增长判断使用
    pub fn set_stack_pointer(&self, sp: VirtAddr) {
        self.memory_set.lock().user_sp = Some(sp);
    }

    /// 处理一次缺页
    ///
    /// `is_user` 为假表示内核在系统调用中访问用户内存，处理方式相同。
    pub fn handle_fault(
        &self,
        va: VirtAddr,
        is_write: bool,
        is_user: bool,
    ) -> VmResult<FaultResolution> {
        let mut frames = self.mm.lock_frames();
        let resolution = self.mm.resolve_fault(&mut frames, self, va, is_write);
        match &resolution {
            Ok(resolution) => trace!(
                "[handle_fault] {:?} {:?} write={} user={}: {:?}",
                self.id,
                va,
                is_write,
                is_user,
                resolution
            ),
            Err(err) => debug!("[handle_fault] {:?} {:?}: {}", self.id, va, err),
        }
        resolution
    }

    pub fn page_kind(&self, va: VirtAddr) -> Option<PageKindTag> {
        self.memory_set.lock().page_kind(va.floor())
    }

    pub fn is_resident(&self, va: VirtAddr) -> bool {
        self.memory_set.lock().is_resident(va.floor())
    }

    /// 驻留的页数
    pub fn resident_pages(&self) -> usize {
        self.memory_set.lock().page_table.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.memory_set.lock().mmap_manager.len()
    }

    // ------------------------------ mmap ------------------------------

    /// 把 `file` 的前 `length` 字节映射到 `base`
    pub fn map(&self, file: Arc<dyn File>, base: VirtAddr, length: usize) -> VmResult<MapId> {
        if base.0 == 0 || !base.is_aligned() {
            return Err(VmError::InvalidArgs("mapping address must be non-zero and page aligned"));
        }
        if length == 0 {
            return Err(VmError::InvalidArgs("mapping length is zero"));
        }
        match base.0.checked_add(length) {
            Some(end) if end <= self.mm.config().stack_bottom() => {}
            _ => return Err(VmError::InvalidArgs("mapping overlaps the stack region")),
        }

        let mut memory_set = self.memory_set.lock();
        if memory_set.destroyed {
            return Err(VmError::InvalidArgs("address space is destroyed"));
        }
        let range = VPNRange::from_va(base, VirtAddr(base.0 + length));
        if let Some(vpn) = range.into_iter().find(|&vpn| memory_set.is_managed(vpn)) {
            return Err(VmError::DuplicateMapping(vpn.base()));
        }
        let mapping = memory_set.mmap_manager.push(file, base, length);
        let id = mapping.id;
        let pages = mapping.pages();
        for (vpn, page) in pages {
            memory_set.spt.register_mmap(vpn, page)?;
        }
        debug!("[map] {:?} {:?} at {:?}, {:#x} bytes", self.id, id, base, length);
        Ok(id)
    }

    /// 映射整个文件
    pub fn map_file(&self, file: Arc<dyn File>, base: VirtAddr) -> VmResult<MapId> {
        let length = file.file_size();
        self.map(file, base, length)
    }

    /// 解除映射，脏页先写回文件
    pub fn unmap(&self, id: MapId) -> VmResult<()> {
        let mut frames = self.mm.lock_frames();
        self.unmap_locked(&mut frames, id)
    }

    fn unmap_locked(&self, frames: &mut FrameTable, id: MapId) -> VmResult<()> {
        let mut memory_set = self.memory_set.lock();
        let mapping = memory_set
            .mmap_manager
            .remove(id)
            .ok_or(VmError::InvalidMapping(id))?;
        // 写回失败时继续拆除剩余的页，返回第一个错误
        let mut result = Ok(());
        for vpn in mapping.vpn_range {
            if let Err(err) = self.unmap_page(frames, &mut memory_set, vpn) {
                warn!("[unmap] {:?} VPN {:#x}: {}", id, vpn.0, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        debug!("[unmap] {:?} {:?}", self.id, mapping);
        result
    }

    fn unmap_page(
        &self,
        frames: &mut FrameTable,
        memory_set: &mut MemorySet,
        vpn: VirtPageNum,
    ) -> VmResult<()> {
        let Some(entry) = memory_set.spt.remove(vpn) else {
            return Ok(());
        };
        let pte = memory_set.page_table.unmap(vpn);
        let mut result = Ok(());
        match entry.kind {
            PageKind::Mmap(page) => {
                if let Some(pte) = pte {
                    if pte.dirty() {
                        result = self.mm.write_back(&page, pte.ppn());
                    }
                }
            }
            PageKind::Swap { slot, .. } => self.mm.swap().free_slot(slot),
            PageKind::File(_) => {}
        }
        if let Some(pte) = pte {
            self.mm.release_frame(frames, pte.ppn());
        }
        result
    }

    /// 进程退出时释放所有页帧、交换槽位和映射
    ///
    /// 先解除所有映射 (写回脏页)，再回收剩下的资源。重复调用没有效果。
    pub fn destroy(&self) -> VmResult<()> {
        let mut frames = self.mm.lock_frames();
        let ids = {
            let mut memory_set = self.memory_set.lock();
            if memory_set.destroyed {
                return Ok(());
            }
            memory_set.destroyed = true;
            memory_set.mmap_manager.ids()
        };
        let mut result = Ok(());
        for id in ids {
            if let Err(err) = self.unmap_locked(&mut frames, id) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        let mut memory_set = self.memory_set.lock();
        let resident: Vec<_> = memory_set.page_table.iter().collect();
        for (vpn, pte) in resident {
            memory_set.page_table.unmap(vpn);
            self.mm.release_frame(&mut frames, pte.ppn());
        }
        for entry in memory_set.spt.drain() {
            if let PageKind::Swap { slot, .. } = entry.kind {
                self.mm.swap().free_slot(slot);
            }
        }
        info!("[destroy] {:?}", self.id);
        result
    }

    // -------------------------- 模拟 CPU 访问 --------------------------

    /// 如同用户态的读操作
    pub fn read_user(&self, va: VirtAddr, buf: &mut [u8]) -> VmResult<()> {
        self.access(va, buf.len(), false, |frame, page_offset, done, len| {
            buf[done..done + len].copy_from_slice(&frame[page_offset..page_offset + len]);
        })
    }

    /// 如同用户态的写操作
    pub fn write_user(&self, va: VirtAddr, data: &[u8]) -> VmResult<()> {
        self.access(va, data.len(), true, |frame, page_offset, done, len| {
            frame[page_offset..page_offset + len].copy_from_slice(&data[done..done + len]);
        })
    }

    /// 逐页访问，缺页时在页帧表锁下处理并完成访问，保证前进
    fn access<F>(&self, va: VirtAddr, len: usize, is_write: bool, mut op: F) -> VmResult<()>
    where
        F: FnMut(&mut [u8], usize, usize, usize),
    {
        let mut done = 0;
        while done < len {
            let cur = offset_addr(va, done)?;
            let vpn = cur.floor();
            let page_offset = cur.page_offset();
            let chunk = (PAGE_SIZE - page_offset).min(len - done);
            if !self.access_resident(cur, is_write, |frame| op(frame, page_offset, done, chunk))? {
                let mut frames = self.mm.lock_frames();
                self.mm.resolve_fault(&mut frames, self, cur, is_write)?;
                let done_now =
                    self.access_resident(cur, is_write, |frame| op(frame, page_offset, done, chunk))?;
                if !done_now {
                    error!("[access] VPN {:#x} is not resident after fault", vpn.0);
                    return Err(VmError::InvalidFault(cur, FaultCause::Unmapped));
                }
            }
            done += chunk;
        }
        Ok(())
    }

    /// 页已驻留时设置访问位并执行 `op`，返回是否执行
    fn access_resident<F>(&self, va: VirtAddr, is_write: bool, op: F) -> VmResult<bool>
    where
        F: FnOnce(&mut [u8]),
    {
        let vpn = va.floor();
        let mut memory_set = self.memory_set.lock();
        let Some(pte) = memory_set.page_table.translate(vpn) else {
            return Ok(false);
        };
        if is_write && !pte.writable() {
            return Err(VmError::InvalidFault(va, FaultCause::WriteToReadOnly));
        }
        memory_set.page_table.mark_access(vpn, is_write);
        let mut frame = self.mm.memory().frame(pte.ppn());
        op(&mut frame[..]);
        Ok(true)
    }

    /// 模拟 MMU 的一次访问: 只设置访问位，不缺页
    pub fn touch(&self, va: VirtAddr) -> bool {
        let vpn = va.floor();
        let mut memory_set = self.memory_set.lock();
        let resident = memory_set.is_resident(vpn);
        memory_set.page_table.mark_access(vpn, false);
        resident
    }

    pub fn is_accessed(&self, va: VirtAddr) -> bool {
        let memory_set = self.memory_set.lock();
        memory_set
            .page_table
            .translate(va.floor())
            .map_or(false, |pte| pte.accessed())
    }

    pub fn is_dirty(&self, va: VirtAddr) -> bool {
        let memory_set = self.memory_set.lock();
        memory_set
            .page_table
            .translate(va.floor())
            .map_or(false, |pte| pte.dirty())
    }

    pub fn clear_accessed(&self, va: VirtAddr) {
        self.memory_set
            .lock()
            .page_table
            .test_and_clear_accessed(va.floor());
    }

    // ---------------------------- 内核拷贝 ----------------------------

    /// 装入并钉住 `[va, va + len)` 覆盖的每一页
    ///
    /// 返回的缓冲区在析构时解除钉住。钉住期间这些页帧不会被换出。
    pub fn pin_user_buffer(&self, va: VirtAddr, len: usize, for_write: bool) -> VmResult<UserBuffer<'_>> {
        let mut frames = self.mm.lock_frames();
        let mut pages: Vec<PinnedPage> = Vec::new();
        let mut done = 0;
        while done < len {
            let cur = match offset_addr(va, done) {
                Ok(cur) => cur,
                Err(err) => {
                    for page in &pages {
                        frames.unpin(page.ppn);
                    }
                    return Err(err);
                }
            };
            let vpn = cur.floor();
            let page_offset = cur.page_offset();
            let chunk = (PAGE_SIZE - page_offset).min(len - done);
            let pinned = self.mm.resolve_fault(&mut frames, self, cur, for_write).and_then(|_| {
                let mut memory_set = self.memory_set.lock();
                let pte = memory_set
                    .page_table
                    .translate(vpn)
                    .ok_or(VmError::InvalidFault(cur, FaultCause::Unmapped))?;
                memory_set.page_table.mark_access(vpn, for_write);
                Ok(pte.ppn())
            });
            match pinned {
                Ok(ppn) => {
                    frames.pin(ppn);
                    pages.push(PinnedPage {
                        vpn,
                        ppn,
                        offset: page_offset,
                        len: chunk,
                    });
                }
                Err(err) => {
                    for page in &pages {
                        frames.unpin(page.ppn);
                    }
                    return Err(err);
                }
            }
            done += chunk;
        }
        Ok(UserBuffer::new(self, pages, for_write))
    }

    /// 从用户内存复制到 `buf`
    pub fn copy_in(&self, va: VirtAddr, buf: &mut [u8]) -> VmResult<usize> {
        let buffer = self.pin_user_buffer(va, buf.len(), false)?;
        Ok(buffer.read(buf))
    }

    /// 把 `data` 复制到用户内存
    pub fn copy_out(&self, va: VirtAddr, data: &[u8]) -> VmResult<usize> {
        let mut buffer = self.pin_user_buffer(va, data.len(), true)?;
        Ok(buffer.write(data))
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            warn!("[AddressSpace::drop] {:?}: {}", self.id, err);
        }
    }
}

/// `va + offset`，越过地址空间顶端时按内核地址处理
fn offset_addr(va: VirtAddr, offset: usize) -> VmResult<VirtAddr> {
    va.0
        .checked_add(offset)
        .map(VirtAddr)
        .ok_or(VmError::InvalidFault(va, FaultCause::KernelAddress))
}
