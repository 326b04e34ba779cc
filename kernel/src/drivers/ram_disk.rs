use alloc::{vec, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use super::{BlockDevice, BlockError};
use crate::consts::BLOCK_SIZE;

/// 内存中的块设备，启动时内容全零
pub struct RamDisk {
    blocks: Mutex<Vec<u8>>,
    num_blocks: usize,
    broken: AtomicBool,
}

impl RamDisk {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![0u8; num_blocks * BLOCK_SIZE]),
            num_blocks,
            broken: AtomicBool::new(false),
        }
    }

    /// 之后所有的读写都失败，用来模拟坏盘
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::Relaxed);
    }

    fn check(&self, blk_id: usize, len: usize) -> Result<(), BlockError> {
        if self.broken.load(Ordering::Relaxed) {
            return Err(BlockError::Io);
        }
        if blk_id >= self.num_blocks {
            return Err(BlockError::OutOfRange(blk_id));
        }
        if len != BLOCK_SIZE {
            return Err(BlockError::BadBuffer(len));
        }
        Ok(())
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, blk_id: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        self.check(blk_id, buf.len())?;
        let start = blk_id * BLOCK_SIZE;
        buf.copy_from_slice(&self.blocks.lock()[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&self, blk_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        self.check(blk_id, buf.len())?;
        let start = blk_id * BLOCK_SIZE;
        self.blocks.lock()[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_independent() {
        let disk = RamDisk::new(4);
        disk.write_block(2, &[7u8; BLOCK_SIZE]).unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        disk.read_block(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        disk.read_block(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[test]
    fn out_of_range_and_broken_disk_fail() {
        let disk = RamDisk::new(1);
        let mut buf = [0u8; BLOCK_SIZE];
        assert_eq!(disk.read_block(1, &mut buf), Err(BlockError::OutOfRange(1)));
        disk.set_broken(true);
        assert_eq!(disk.read_block(0, &mut buf), Err(BlockError::Io));
    }
}
