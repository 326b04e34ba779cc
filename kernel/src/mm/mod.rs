//! 按需分页
//!
//! 锁序 (先获取的在前):
//!
//! 1. 页帧表 (`MemoryManager::frames`)，所有分配、换出、缺页处理都在它之下串行化
//! 2. 地址空间 (`AddressSpace::memory_set`)
//! 3. 交换区
//! 4. 单个页帧的数据
//!
//! 持有地址空间锁时不得再去获取页帧表锁。

mod address;
mod address_space;
mod evict;
mod fault;
mod frame_allocator;
mod frame_table;
mod manager;
mod memory_set;
mod mmap;
mod page;
mod page_table;
mod stack;
mod sup_page_table;
mod swap;
mod user_buffer;

pub use address::*;
pub use address_space::AddressSpace;
pub use fault::FaultResolution;
pub use frame_allocator::{FrameAllocator, FrameData, PhysMemory, StackFrameAllocator};
pub use frame_table::{FrameEntry, FrameTable};
pub use manager::MemoryManager;
pub use memory_set::MemorySet;
pub use mmap::{MapId, Mapping, MmapManager};
pub use page::{FilePage, MmapPage, Origin, PageKind, PageKindTag, SupPageEntry};
pub use page_table::{PTEFlags, PageTable, PageTableEntry};
pub use sup_page_table::SupPageTable;
pub use swap::{SwapSlot, SwapStore};
pub use user_buffer::UserBuffer;

/// 地址空间编号，同一个 `MemoryManager` 内唯一
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub usize);
