pub trait File: Send + Sync {
    fn name(&self) -> &str;
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool;
    /// 从 `offset` 处读取数据放到缓冲区中, 最多将缓冲区填满, 并返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize;
    /// 将缓冲区中的数据写到 `offset` 处, 返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> usize;
    fn file_size(&self) -> usize;
}
