//! 用户进程的按需分页虚拟内存子系统
//!
//! 物理页帧池、补充页表、时钟置换、交换区、缺页处理、文件映射以及用户栈增长。
//! 硬件部分 (物理内存、页表的访问位/脏位、块设备) 由本 crate 模拟，
//! 因此同一份代码既能嵌入内核，也能在宿主机上测试。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

#[macro_use]
pub mod console;

pub mod config;
pub mod consts;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod logging;
pub mod mm;
pub mod trap;

pub use config::MmConfig;
pub use error::{FaultCause, VmError, VmResult};
pub use mm::{AddressSpace, FaultResolution, MapId, MemoryManager, PageKindTag, SpaceId, UserBuffer};
pub use trap::{handle_page_fault, FaultOutcome, PageFault};
