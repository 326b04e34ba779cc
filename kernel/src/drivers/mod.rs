//! 交换区所用的块设备

mod ram_disk;

pub use ram_disk::RamDisk;

use core::any::Any;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block {0} is out of range")]
    OutOfRange(usize),
    #[error("buffer length {0} is not one block")]
    BadBuffer(usize),
    #[error("device i/o failed")]
    Io,
}

/// 以扇区 (`BLOCK_SIZE` 字节) 为单位读写的设备
///
/// [`BLOCK_SIZE`]: crate::consts::BLOCK_SIZE
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, blk_id: usize, buf: &mut [u8]) -> Result<(), BlockError>;
    fn write_block(&self, blk_id: usize, buf: &[u8]) -> Result<(), BlockError>;
    fn num_blocks(&self) -> usize;
}
