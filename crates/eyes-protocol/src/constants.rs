//! 协议常量定义

/// 眼球控制器 I2C 从机地址
pub const EYES_I2C_ADDR: u16 = 0x42;

/// 探测读返回的"就绪"字节
pub const EYES_READY: u8 = 0x01;

/// 命令包长度（字节）
pub const EYES_PACKET_SIZE: usize = 12;

/// 命令包包头
pub const EYES_CMD_HEADER: u8 = 0xBB;

// 包内字节索引
pub const PKT_HEADER: usize = 0;
pub const PKT_EYESTATE: usize = 1;
pub const PKT_RESET: usize = 2;
pub const PKT_LID: usize = 3;
pub const PKT_MOVE: usize = 4;
pub const PKT_POS_R: usize = 5;
pub const PKT_POS_L: usize = 6;
pub const PKT_BLINK: usize = 7;
pub const PKT_PUPIL_R: usize = 8;
pub const PKT_PUPIL_L: usize = 9;
pub const PKT_RESERVED: usize = 10;
pub const PKT_CHECKSUM: usize = 11;

/// 瞳孔大小输入下限（%）
pub const PUPIL_MIN: i32 = 5;

/// 瞳孔大小输入上限（%）
pub const PUPIL_MAX: i32 = 90;

/// 瞳孔编码值上限（`PUPIL_MAX - PUPIL_MIN`）
pub const PUPIL_ENCODED_MAX: u8 = 85;

/// 启动时写入共享内存的默认瞳孔大小（%）
pub const DEFAULT_PUPIL: i32 = 70;
