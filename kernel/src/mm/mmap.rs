use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{self, Debug, Formatter};

use super::address::{VPNRange, VirtAddr, VirtPageNum};
use super::page::MmapPage;
use crate::consts::PAGE_SIZE;
use crate::fs::File;

/// 一次 mmap 请求的编号，在地址空间内唯一且不复用
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub usize);

/// 一次 mmap 请求建立的连续页
#[derive(Clone)]
pub struct Mapping {
    pub id: MapId,
    pub file: Arc<dyn File>,
    pub vpn_range: VPNRange,
    /// 映射的文件字节数
    pub length: usize,
}

impl Mapping {
    /// 为映射中的每一页生成补充页表项内容
    ///
    /// 文件偏移每页前进 `PAGE_SIZE`，最后一页只读入文件剩余的字节，其余补零。
    pub fn pages(&self) -> Vec<(VirtPageNum, MmapPage)> {
        // 超出文件末尾的部分只补零，也不写回
        let valid = self.length.min(self.file.file_size());
        let mut offset = 0;
        let mut pages = Vec::with_capacity(self.vpn_range.len());
        for vpn in self.vpn_range {
            let read_len = PAGE_SIZE.min(valid.saturating_sub(offset));
            pages.push((
                vpn,
                MmapPage {
                    file: self.file.clone(),
                    offset,
                    read_len,
                    mapping: self.id,
                },
            ));
            offset += PAGE_SIZE;
        }
        pages
    }
}

impl Debug for Mapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "Mapping:{:?},file={},{:?},len={:#x}",
            self.id,
            self.file.name(),
            self.vpn_range,
            self.length
        ))
    }
}

/// mmap 块管理器
///
/// - `next_id`: 下一个映射编号
/// - `mappings`: 映射编号 -> 映射
#[derive(Default)]
pub struct MmapManager {
    next_id: usize,
    mappings: BTreeMap<MapId, Mapping>,
}

impl MmapManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个新映射，页表项由调用者登记
    pub fn push(&mut self, file: Arc<dyn File>, start_va: VirtAddr, length: usize) -> &Mapping {
        let id = MapId(self.next_id);
        self.next_id += 1;
        let end_va = VirtAddr(start_va.0 + length);
        let mapping = Mapping {
            id,
            file,
            vpn_range: VPNRange::from_va(start_va, end_va),
            length,
        };
        self.mappings.entry(id).or_insert(mapping)
    }

    pub fn get(&self, id: MapId) -> Option<&Mapping> {
        self.mappings.get(&id)
    }

    pub fn remove(&mut self, id: MapId) -> Option<Mapping> {
        self.mappings.remove(&id)
    }

    pub fn ids(&self) -> Vec<MapId> {
        self.mappings.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
