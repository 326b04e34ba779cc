use alloc::{string::String, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::RwLock;

use super::File;

/// 内存中的定长文件
///
/// 写入不会扩展文件。`fail_after` 之后的读写只完成一部分，用于模拟磁盘错误。
pub struct RamFile {
    name: String,
    data: RwLock<Vec<u8>>,
    writable: bool,
    fail_after: AtomicUsize,
}

impl RamFile {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: String::from(name),
            data: RwLock::new(data),
            writable: true,
            fail_after: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn read_only(name: &str, data: Vec<u8>) -> Self {
        Self {
            writable: false,
            ..Self::new(name, data)
        }
    }

    /// 超过 `bytes` 的读写都被截断
    pub fn truncate_io_after(&self, bytes: usize) {
        self.fail_after.store(bytes, Ordering::Relaxed);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn io_len(&self, offset: usize, len: usize, size: usize) -> usize {
        let limit = self.fail_after.load(Ordering::Relaxed).min(size);
        if offset >= limit {
            0
        } else {
            len.min(limit - offset)
        }
    }
}

impl File for RamFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let data = self.data.read();
        let len = self.io_len(offset, buf.len(), data.len());
        if len == 0 {
            return 0;
        }
        buf[..len].copy_from_slice(&data[offset..offset + len]);
        len
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        if !self.writable {
            return 0;
        }
        let mut data = self.data.write();
        let size = data.len();
        let len = self.io_len(offset, buf.len(), size);
        if len == 0 {
            return 0;
        }
        data[offset..offset + len].copy_from_slice(&buf[..len]);
        len
    }

    fn file_size(&self) -> usize {
        self.data.read().len()
    }
}
