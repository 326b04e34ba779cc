//! 虚拟内存子系统产生的错误

use core::fmt;

use thiserror::Error;

use crate::mm::{MapId, VirtAddr};

pub type VmResult<T> = core::result::Result<T, VmError>;

/// 缺页无法解决的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultCause {
    /// 既没有补充页表项，也不在栈增长范围内
    Unmapped,
    /// 对只读页的写入
    WriteToReadOnly,
    /// 栈增长超过了最大栈大小
    StackLimit,
    /// 访问了用户地址空间之外的地址
    KernelAddress,
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FaultCause::Unmapped => "no page is described there",
            FaultCause::WriteToReadOnly => "write to a read-only page",
            FaultCause::StackLimit => "beyond the maximum stack size",
            FaultCause::KernelAddress => "outside user address space",
        };
        f.write_str(reason)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("out of memory: no free frame and no evictable victim")]
    OutOfMemory,

    #[error("page at {0:?} is already mapped or described")]
    DuplicateMapping(VirtAddr),

    #[error("swap store has no free slot")]
    SwapFull,

    #[error("invalid fault at {0:?}: {1}")]
    InvalidFault(VirtAddr, FaultCause),

    /// 文件或交换区的读写没有完成预期的字节数
    #[error("backing store {store} transferred {actual} of {expected} bytes")]
    BackingStoreIo {
        store: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("mapping {0:?} does not exist")]
    InvalidMapping(MapId),

    #[error("{0}")]
    InvalidArgs(&'static str),
}

impl VmError {
    /// 对应系统调用层返回给用户的错误码
    pub fn error_code(&self) -> isize {
        match self {
            VmError::OutOfMemory => -12,         // ENOMEM
            VmError::DuplicateMapping(_) => -17, // EEXIST
            VmError::SwapFull => -12,            // ENOMEM
            VmError::InvalidFault(..) => -14,    // EFAULT
            VmError::BackingStoreIo { .. } => -5, // EIO
            VmError::InvalidMapping(_) => -22,   // EINVAL
            VmError::InvalidArgs(_) => -22,      // EINVAL
        }
    }

    pub(crate) fn short_file(expected: usize, actual: usize) -> Self {
        VmError::BackingStoreIo {
            store: "file",
            expected,
            actual,
        }
    }

    pub(crate) fn swap_io() -> Self {
        VmError::BackingStoreIo {
            store: "swap",
            expected: crate::consts::PAGE_SIZE,
            actual: 0,
        }
    }
}
