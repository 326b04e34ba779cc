pub const PAGE_SIZE: usize = 0x1000;

/// 用户虚拟地址空间的顶端，栈从这里向下增长
pub const USER_TOP: usize = 0xc000_0000;

/// 用户栈的最大大小
pub const USER_STACK_SIZE: usize = 8 * (1 << 20);

/// 栈指针下方仍视为合法栈访问的字节数 (一次压入 8 个 32 位寄存器)
pub const STACK_SLACK: usize = 32;

/// 默认的用户物理页帧池大小
pub const USER_FRAMES: usize = 256;

/// 默认的交换区槽位数
pub const SWAP_SLOTS: usize = 1024;

pub const BLOCK_SIZE: usize = 512;

pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / BLOCK_SIZE;

/// 致命缺页时进程的退出码
pub const FATAL_EXIT_STATUS: i32 = -1;
