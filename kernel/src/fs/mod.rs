//! 本子系统对文件系统的全部需求: 按偏移读写一个已打开的文件

pub mod file;
mod ram_file;

pub use file::File;
pub use ram_file::RamFile;
