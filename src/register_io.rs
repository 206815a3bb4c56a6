/// 寄存器I/O端口抽象
///
/// 驱动核心只依赖该最小能力读写传感器寄存器，不关心底层总线的
/// 打开、地址绑定与释放，这些由外部协作者负责。端口在一个读取
/// 周期内被独占借用，周期结束随借用一起归还。读写失败直接返回
/// Err，本层不做重试。
pub trait RegisterIo {
    /// 读取单个寄存器
    fn read_register(&mut self, reg: u8) -> anyhow::Result<u8>;

    /// 从起始地址连续读取多个寄存器，读满整个缓冲区
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> anyhow::Result<()>;

    /// 写入单个寄存器
    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()>;
}
