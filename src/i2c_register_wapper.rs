use embedded_hal::i2c::I2c;

use crate::register_io::RegisterIo;

/// I2C寄存器端口Wapper
///
/// 将任意实现embedded-hal I2C总线的设备（树莓派上通常是启用hal
/// 特性的rppal::i2c::I2c）与一个从设备地址绑定，适配为RegisterIo
/// 端口。端口独占持有总线句柄，一个读取周期内的寄存器事务天然串行。
pub struct I2cRegisterWapper<I2C> {
    /// I2C总线句柄
    i2c: I2C,
    /// I2C从设备地址
    /// - BME280的地址通常为: 0x76 (SDO接地) 或 0x77 (SDO接VDDIO)
    i2c_addr: u8,
}

impl<I2C: I2c> I2cRegisterWapper<I2C> {
    /// 创建端口实例
    pub fn new(i2c: I2C, i2c_addr: u8) -> Self {
        Self { i2c, i2c_addr }
    }

    /// 归还内部的I2C总线句柄，便于在读取周期结束后确定性地释放总线
    pub fn into_inner(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> RegisterIo for I2cRegisterWapper<I2C> {
    fn read_register(&mut self, reg: u8) -> anyhow::Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.i2c_addr, &[reg], &mut buf)
            .map_err(|err| anyhow::anyhow!("读取寄存器0x{:02X}失败: {:?}", reg, err))?;

        // OK
        Ok(buf[0])
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> anyhow::Result<()> {
        self.i2c.write_read(self.i2c_addr, &[reg], buf).map_err(|err| {
            anyhow::anyhow!("读取寄存器0x{:02X}起始的{}字节失败: {:?}", reg, buf.len(), err)
        })
    }

    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()> {
        self.i2c
            .write(self.i2c_addr, &[reg, value])
            .map_err(|err| anyhow::anyhow!("写入寄存器0x{:02X}失败: {:?}", reg, err))
    }
}
