use std::thread;
use std::time::Duration;

use crate::register_io::RegisterIo;

// BME280寄存器地址
// cf. https://trac.switch-science.com/wiki/BME280
/// 温度/压力校准参数块 (0x88-0x9F, 24字节)
const REG_CALIB_00: u8 = 0x88;
/// 湿度校准参数dig_H1 (1字节)
const REG_CALIB_25: u8 = 0xA1;
/// 剩余湿度校准参数块 (0xE1-0xE7, 7字节)
const REG_CALIB_26: u8 = 0xE1;
/// 软复位寄存器
const REG_RESET: u8 = 0xE0;
/// 湿度采样控制寄存器
const REG_CTRL_HUM: u8 = 0xF2;
/// 状态寄存器
const REG_STATUS: u8 = 0xF3;
/// 测量控制寄存器（模式 + 温度/压力采样率）
const REG_CTRL_MEAS: u8 = 0xF4;
/// 配置寄存器（待机时间 + 滤波器）
const REG_CONFIG: u8 = 0xF5;
/// 原始测量数据块 (0xF7-0xFE, 8字节)
const REG_DATA: u8 = 0xF7;

// 控制寄存器写入值
/// 湿度过采样 x1 (osrs_h = 1)
const CTRL_HUM_OSRS_X1: u8 = 0x01;
/// 正常模式，温度、压力过采样 x1 (osrs_t = 1, osrs_p = 1, mode = 3)
const CTRL_MEAS_NORMAL_X1: u8 = 0x27;
/// 待机时间1000ms，滤波器关闭 (t_sb = 5, filter = 0)
const CONFIG_STANDBY_1000MS: u8 = 0xA0;
/// 软复位魔术字节
const RESET_MAGIC: u8 = 0xB6;

/// BME280驱动错误
#[derive(Debug)]
pub enum Bme280Error {
    /// 寄存器读写在传输层失败，本次读取周期整体作废
    Io(anyhow::Error),
    /// 补偿公式产生退化结果（分母为零或非有限值），与总线错误区分上报
    SensorData(String),
}

impl std::fmt::Display for Bme280Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "寄存器读写失败: {}", err),
            Self::SensorData(msg) => write!(f, "传感器数据异常: {}", msg),
        }
    }
}

impl std::error::Error for Bme280Error {}

/// BME280传感器校准参数
///
/// 出厂时烧录在传感器NVM中的修正常数，每颗传感器各不相同，
/// 用于把原始ADC计数换算成物理量。每个读取周期从两个固定
/// 寄存器块整体读出并一次性解码，不对外暴露部分解码结果。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Calibration {
    // 温度校准参数组
    /// 温度校准系数1
    /// - 类型: 无符号16位，地址: 0x88-0x89 (小端序)
    pub dig_t1: u16,
    /// 温度校准系数2
    /// - 类型: 有符号16位，地址: 0x8A-0x8B (小端序)
    pub dig_t2: i16,
    /// 温度校准系数3
    /// - 类型: 有符号16位，地址: 0x8C-0x8D (小端序)
    pub dig_t3: i16,

    // 压力校准参数组
    /// 压力校准系数1
    /// - 类型: 无符号16位，地址: 0x8E-0x8F (小端序)
    pub dig_p1: u16,
    /// 压力校准系数2
    /// - 类型: 有符号16位，地址: 0x90-0x91 (小端序)
    pub dig_p2: i16,
    /// 压力校准系数3
    /// - 类型: 有符号16位，地址: 0x92-0x93 (小端序)
    pub dig_p3: i16,
    /// 压力校准系数4
    /// - 类型: 有符号16位，地址: 0x94-0x95 (小端序)
    pub dig_p4: i16,
    /// 压力校准系数5
    /// - 类型: 有符号16位，地址: 0x96-0x97 (小端序)
    pub dig_p5: i16,
    /// 压力校准系数6
    /// - 类型: 有符号16位，地址: 0x98-0x99 (小端序)
    pub dig_p6: i16,
    /// 压力校准系数7
    /// - 类型: 有符号16位，地址: 0x9A-0x9B (小端序)
    pub dig_p7: i16,
    /// 压力校准系数8
    /// - 类型: 有符号16位，地址: 0x9C-0x9D (小端序)
    pub dig_p8: i16,
    /// 压力校准系数9
    /// - 类型: 有符号16位，地址: 0x9E-0x9F (小端序)
    pub dig_p9: i16,

    // 湿度校准参数组
    /// 湿度校准系数1
    /// - 类型: 无符号8位，地址: 0xA1
    pub dig_h1: u8,
    /// 湿度校准系数2
    /// - 类型: 有符号16位，地址: 0xE1-0xE2 (小端序)
    pub dig_h2: i16,
    /// 湿度校准系数3
    /// - 类型: 无符号8位，地址: 0xE3
    pub dig_h3: u8,
    /// 湿度校准系数4
    /// - 类型: 有符号12位打包值，存储为i16
    /// - 存储格式: 0xE4[7:0]为高8位，0xE5[3:0]为低4位
    pub dig_h4: i16,
    /// 湿度校准系数5
    /// - 类型: 有符号12位打包值，存储为i16
    /// - 存储格式: 0xE5[7:4]为低4位，0xE6[7:0]为高8位
    /// - 解码时必须把0xE5当作无符号字节右移4位，带符号移位会悄悄得出错误值
    pub dig_h5: i16,
    /// 湿度校准系数6
    /// - 类型: 有符号8位，地址: 0xE7
    pub dig_h6: i8,
}

/// 一次8字节测量块读取得到的原始ADC值
#[derive(Debug, Clone, Copy)]
pub struct RawAdc {
    /// 20位温度ADC值
    pub adc_t: u32,
    /// 20位压力ADC值
    pub adc_p: u32,
    /// 16位湿度ADC值
    pub adc_h: u16,
}

/// 补偿后的测量结果，核心对外暴露的唯一值
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    /// 温度（℃）
    pub temperature: f64,
    /// 相对湿度（%RH），限制在0~100范围内
    pub humidity: f64,
    /// 大气压力（hPa）
    pub pressure: f64,
}

/// 状态寄存器 (0xF3) 解析结果
#[derive(Debug, Clone, Copy)]
pub struct Status {
    /// 正在进行温度、压力、湿度转换
    pub measuring: bool,
    /// 正在从NVM复制校准数据，复制完成前不应读取校准寄存器
    pub im_update: bool,
}

/// 从两个校准寄存器块的原始字节解码出全部校准参数
///
/// 纯函数：相同的输入字节永远产生相同的Calibration。
/// 16位参数为小端序，有符号参数按二进制补码重新解释
/// （from_le_bytes即为"低字节 + 高字节*256，超过32767减65536"）。
pub fn decode_calibration(block_a: &[u8; 24], h1: u8, block_b: &[u8; 7]) -> Calibration {
    Calibration {
        dig_t1: u16::from_le_bytes([block_a[0], block_a[1]]),
        dig_t2: i16::from_le_bytes([block_a[2], block_a[3]]),
        dig_t3: i16::from_le_bytes([block_a[4], block_a[5]]),
        dig_p1: u16::from_le_bytes([block_a[6], block_a[7]]),
        dig_p2: i16::from_le_bytes([block_a[8], block_a[9]]),
        dig_p3: i16::from_le_bytes([block_a[10], block_a[11]]),
        dig_p4: i16::from_le_bytes([block_a[12], block_a[13]]),
        dig_p5: i16::from_le_bytes([block_a[14], block_a[15]]),
        dig_p6: i16::from_le_bytes([block_a[16], block_a[17]]),
        dig_p7: i16::from_le_bytes([block_a[18], block_a[19]]),
        dig_p8: i16::from_le_bytes([block_a[20], block_a[21]]),
        dig_p9: i16::from_le_bytes([block_a[22], block_a[23]]),
        dig_h1: h1,
        dig_h2: i16::from_le_bytes([block_b[0], block_b[1]]),
        dig_h3: block_b[2],
        // 12位打包值：先把无符号字节扩宽到i16再移位拼接
        dig_h4: (i16::from(block_b[3]) << 4) | (i16::from(block_b[4]) & 0x0F),
        dig_h5: (i16::from(block_b[4]) >> 4) | (i16::from(block_b[5]) << 4),
        dig_h6: block_b[6] as i8,
    }
}

/// 读取并解码校准参数
///
/// 依次读取三个固定寄存器块：0x88起24字节、0xA1一字节、0xE1起7字节。
/// 任何一次读取失败立即以Io错误中止，不做重试。
pub fn read_calibration<P: RegisterIo>(port: &mut P) -> Result<Calibration, Bme280Error> {
    // 读取温度/压力校准参数 (0x88-0x9F)
    let mut block_a = [0u8; 24];
    port.read_registers(REG_CALIB_00, &mut block_a).map_err(Bme280Error::Io)?;

    // 读取湿度校准参数dig_H1 (0xA1)
    let h1 = port.read_register(REG_CALIB_25).map_err(Bme280Error::Io)?;

    // 读取剩余湿度校准参数 (0xE1-0xE7)
    let mut block_b = [0u8; 7];
    port.read_registers(REG_CALIB_26, &mut block_b).map_err(Bme280Error::Io)?;

    // OK
    Ok(decode_calibration(&block_a, h1, &block_b))
}

/// 写入三个控制寄存器，使传感器进入正常测量模式
///
/// 写入顺序固定：湿度控制寄存器必须先于测量控制寄存器写入，
/// ctrl_hum的修改在ctrl_meas写入后才会被锁存生效。中途写入
/// 失败时传感器处于部分配置状态，调用方应把整个读取周期当作失败。
pub fn configure<P: RegisterIo>(port: &mut P) -> Result<(), Bme280Error> {
    // 配置湿度采样率 (osrs_h = 1x)
    port.write_register(REG_CTRL_HUM, CTRL_HUM_OSRS_X1).map_err(Bme280Error::Io)?;
    thread::sleep(Duration::from_millis(10));

    // 配置温度、压力采样率 (osrs_t = 1x, osrs_p = 1x) 和正常模式
    port.write_register(REG_CTRL_MEAS, CTRL_MEAS_NORMAL_X1).map_err(Bme280Error::Io)?;
    thread::sleep(Duration::from_millis(10));

    // 配置待机时间1000ms，滤波器关闭
    port.write_register(REG_CONFIG, CONFIG_STANDBY_1000MS).map_err(Bme280Error::Io)?;
    thread::sleep(Duration::from_millis(10));

    // OK
    Ok(())
}

/// 读取8字节原始测量数据块并拆出三个ADC值
pub fn read_raw<P: RegisterIo>(port: &mut P) -> Result<RawAdc, Bme280Error> {
    let mut data = [0u8; 8];
    port.read_registers(REG_DATA, &mut data).map_err(Bme280Error::Io)?;

    // 解析20位压力数据 (0xF7-0xF9)，u32运算避免高字节项溢出
    let adc_p = (u32::from(data[0]) << 12) | (u32::from(data[1]) << 4) | (u32::from(data[2]) >> 4);
    // 解析20位温度数据 (0xFA-0xFC)
    let adc_t = (u32::from(data[3]) << 12) | (u32::from(data[4]) << 4) | (u32::from(data[5]) >> 4);
    // 解析16位湿度数据 (0xFD-0xFE)
    let adc_h = u16::from_be_bytes([data[6], data[7]]);

    // OK
    Ok(RawAdc { adc_t, adc_p, adc_h })
}

/// 温度补偿，返回摄氏温度和t_fine中间值
///
/// t_fine向零截断取整后再转回f64：参考实现以整型存储该中间值，
/// 压力和湿度公式都是针对截断后的值标定的，改成四舍五入或保留
/// 小数会改变输出。
fn compensate_temperature(calib: &Calibration, adc_t: u32) -> (f64, f64) {
    let adc_t = f64::from(adc_t);
    let dig_t1 = f64::from(calib.dig_t1);
    let dig_t2 = f64::from(calib.dig_t2);
    let dig_t3 = f64::from(calib.dig_t3);

    let var1 = (adc_t / 16384.0 - dig_t1 / 1024.0) * dig_t2;
    let var2 =
        (adc_t / 131072.0 - dig_t1 / 8192.0) * (adc_t / 131072.0 - dig_t1 / 8192.0) * dig_t3;

    let t_fine = (var1 + var2) as i64 as f64;
    let temperature = (var1 + var2) / 5120.0;

    (temperature, t_fine)
}

/// 压力补偿，结果单位hPa
fn compensate_pressure(calib: &Calibration, adc_p: u32, t_fine: f64) -> Result<f64, Bme280Error> {
    let dig_p1 = f64::from(calib.dig_p1);
    let dig_p2 = f64::from(calib.dig_p2);
    let dig_p3 = f64::from(calib.dig_p3);
    let dig_p4 = f64::from(calib.dig_p4);
    let dig_p5 = f64::from(calib.dig_p5);
    let dig_p6 = f64::from(calib.dig_p6);
    let dig_p7 = f64::from(calib.dig_p7);
    let dig_p8 = f64::from(calib.dig_p8);
    let dig_p9 = f64::from(calib.dig_p9);

    let mut var1 = t_fine / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * dig_p6 / 32768.0;
    var2 += var1 * dig_p5 * 2.0;
    var2 = var2 / 4.0 + dig_p4 * 65536.0;
    var1 = (dig_p3 * var1 * var1 / 524288.0 + dig_p2 * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * dig_p1;

    // 分母为零时压力无定义，作为数据错误上报，不能让NaN/Infinity悄悄传播
    if var1 == 0.0 {
        return Err(Bme280Error::SensorData("压力补偿分母为零".to_string()));
    }

    let mut p = 1048576.0 - f64::from(adc_p);
    p = (p - var2 / 4096.0) * 6250.0 / var1;
    var1 = dig_p9 * p * p / 2147483648.0;
    var2 = p * dig_p8 / 32768.0;
    let pressure = (p + (var1 + var2 + dig_p7) / 16.0) / 100.0;

    if !pressure.is_finite() {
        return Err(Bme280Error::SensorData(format!("压力补偿结果非有限值: {}", pressure)));
    }

    // OK
    Ok(pressure)
}

/// 湿度补偿，结果限制在0~100%RH
fn compensate_humidity(calib: &Calibration, adc_h: u16, t_fine: f64) -> f64 {
    let dig_h1 = f64::from(calib.dig_h1);
    let dig_h2 = f64::from(calib.dig_h2);
    let dig_h3 = f64::from(calib.dig_h3);
    let dig_h4 = f64::from(calib.dig_h4);
    let dig_h5 = f64::from(calib.dig_h5);
    let dig_h6 = f64::from(calib.dig_h6);

    let var_h = t_fine - 76800.0;
    let var_h = (f64::from(adc_h) - (dig_h4 * 64.0 + dig_h5 / 16384.0 * var_h))
        * (dig_h2 / 65536.0
            * (1.0 + dig_h6 / 67108864.0 * var_h * (1.0 + dig_h3 / 67108864.0 * var_h)));
    let humidity = var_h * (1.0 - dig_h1 * var_h / 524288.0);

    humidity.clamp(0.0, 100.0)
}

/// 对一组原始ADC值执行完整的补偿计算
///
/// t_fine只在温度补偿中计算一次，之后作为不可变值同时传给压力
/// 和湿度公式，两个消费者不会各算各的。三个结果要么一起算出，
/// 要么整体失败，不返回部分结果。
pub fn compensate(calib: &Calibration, raw: &RawAdc) -> Result<Measurement, Bme280Error> {
    let (temperature, t_fine) = compensate_temperature(calib, raw.adc_t);
    let pressure = compensate_pressure(calib, raw.adc_p, t_fine)?;
    let humidity = compensate_humidity(calib, raw.adc_h, t_fine);

    // NaN能穿过clamp，这里统一兜底检查
    if !temperature.is_finite() || !humidity.is_finite() {
        return Err(Bme280Error::SensorData("补偿结果非有限值".to_string()));
    }

    // OK
    Ok(Measurement { temperature, humidity, pressure })
}

/// 执行一个完整的读取周期
///
/// 校准读取 → 模式配置 → 原始数据读取 → 补偿计算，共六次串行
/// 总线事务。校准参数每个周期都重新读取，不跨周期缓存；需要
/// 缓存的调用方可以自行组合read_calibration与compensate。
pub fn read_measurement<P: RegisterIo>(port: &mut P) -> Result<Measurement, Bme280Error> {
    let calib = read_calibration(port)?;
    configure(port)?;
    let raw = read_raw(port)?;
    compensate(&calib, &raw)
}

/// 读取状态寄存器
pub fn read_status<P: RegisterIo>(port: &mut P) -> Result<Status, Bme280Error> {
    let status = port.read_register(REG_STATUS).map_err(Bme280Error::Io)?;

    // OK
    Ok(Status { measuring: status & 0x08 != 0, im_update: status & 0x01 != 0 })
}

/// 软复位传感器
pub fn reset<P: RegisterIo>(port: &mut P) -> Result<(), Bme280Error> {
    port.write_register(REG_RESET, RESET_MAGIC).map_err(Bme280Error::Io)?;

    // 等待复位完成
    thread::sleep(Duration::from_millis(5));

    // OK
    Ok(())
}
