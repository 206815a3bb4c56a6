//! 树莓派BME280环境传感器驱动
//!
//! 通过寄存器I/O端口抽象读取BME280的校准参数与原始ADC数据，
//! 使用博世数据手册的双精度浮点补偿公式换算出温度、湿度和压力。

pub mod i2c_register_wapper;
pub mod register_io;
pub mod sensor;
