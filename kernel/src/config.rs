//! 内存子系统的启动参数

use crate::consts::{
    PAGE_SIZE, SECTORS_PER_PAGE, STACK_SLACK, SWAP_SLOTS, USER_FRAMES, USER_STACK_SIZE, USER_TOP,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MmConfig {
    /// 用户页帧池中的页帧数
    pub user_frames: usize,
    /// 交换区槽位数
    pub swap_slots: usize,
    /// 用户地址空间顶端 (不含)
    pub user_top: usize,
    /// 栈的最大字节数
    pub stack_limit: usize,
    /// 栈指针下方允许访问的字节数
    pub stack_slack: usize,
}

impl Default for MmConfig {
    fn default() -> Self {
        Self {
            user_frames: USER_FRAMES,
            swap_slots: SWAP_SLOTS,
            user_top: USER_TOP,
            stack_limit: USER_STACK_SIZE,
            stack_slack: STACK_SLACK,
        }
    }
}

impl MmConfig {
    pub fn with_user_frames(mut self, user_frames: usize) -> Self {
        self.user_frames = user_frames;
        self
    }

    pub fn with_swap_slots(mut self, swap_slots: usize) -> Self {
        self.swap_slots = swap_slots;
        self
    }

    pub fn with_user_top(mut self, user_top: usize) -> Self {
        self.user_top = user_top;
        self
    }

    pub fn with_stack_limit(mut self, stack_limit: usize) -> Self {
        self.stack_limit = stack_limit;
        self
    }

    pub fn with_stack_slack(mut self, stack_slack: usize) -> Self {
        self.stack_slack = stack_slack;
        self
    }

    /// 一个有 `blocks` 个扇区的块设备能容纳的交换槽位数
    pub fn swap_slots_for_blocks(blocks: usize) -> usize {
        blocks / SECTORS_PER_PAGE
    }

    /// 栈区域的最低地址
    pub fn stack_bottom(&self) -> usize {
        self.user_top - self.stack_limit
    }

    pub(crate) fn validate(&self) -> bool {
        self.user_top % PAGE_SIZE == 0
            && self.stack_limit % PAGE_SIZE == 0
            && self.stack_limit <= self.user_top
            && self.user_frames > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stack_region_ends_at_user_top() {
        let config = MmConfig::default();
        assert!(config.validate());
        assert_eq!(config.stack_bottom(), USER_TOP - USER_STACK_SIZE);
    }

    #[test]
    fn swap_slots_round_down_to_whole_pages() {
        assert_eq!(MmConfig::swap_slots_for_blocks(8 * 3 + 7), 3);
    }

    #[test]
    fn misaligned_stack_limit_is_rejected() {
        let config = MmConfig::default().with_stack_limit(PAGE_SIZE + 1);
        assert!(!config.validate());
    }
}
