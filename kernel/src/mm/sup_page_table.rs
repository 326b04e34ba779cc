//! 每个地址空间一张的补充页表: 虚拟页号 -> 补充页表项

use hashbrown::HashMap;

use super::address::VirtPageNum;
use super::page::{FilePage, MmapPage, PageKind, SupPageEntry};
use crate::error::{VmError, VmResult};

#[derive(Default)]
pub struct SupPageTable {
    entries: HashMap<VirtPageNum, SupPageEntry>,
}

impl SupPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_file_backed(&mut self, vpn: VirtPageNum, page: FilePage) -> VmResult<()> {
        self.insert(SupPageEntry::new(vpn, PageKind::File(page)))
    }

    pub fn register_mmap(&mut self, vpn: VirtPageNum, page: MmapPage) -> VmResult<()> {
        self.insert(SupPageEntry::new(vpn, PageKind::Mmap(page)))
    }

    pub fn insert(&mut self, entry: SupPageEntry) -> VmResult<()> {
        if self.entries.contains_key(&entry.vpn) {
            return Err(VmError::DuplicateMapping(entry.vpn.base()));
        }
        self.entries.insert(entry.vpn, entry);
        Ok(())
    }

    pub fn lookup(&self, vpn: VirtPageNum) -> Option<&SupPageEntry> {
        self.entries.get(&vpn)
    }

    pub fn lookup_mut(&mut self, vpn: VirtPageNum) -> Option<&mut SupPageEntry> {
        self.entries.get_mut(&vpn)
    }

    pub fn remove(&mut self, vpn: VirtPageNum) -> Option<SupPageEntry> {
        self.entries.remove(&vpn)
    }

    pub fn contains(&self, vpn: VirtPageNum) -> bool {
        self.entries.contains_key(&vpn)
    }

    /// 取出全部表项，表变为空
    pub fn drain(&mut self) -> impl Iterator<Item = SupPageEntry> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
