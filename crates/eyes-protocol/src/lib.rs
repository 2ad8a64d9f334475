//! # Eyes Protocol
//!
//! 眼球控制器（RP2040）I2C 命令包协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 地址、包头、字节索引等协议常量
//! - `state`: 眼球状态取值（枚举）与共享内存中的左右眼状态
//! - `packet`: 命令包编码、校验和计算
//!
//! ## 包格式
//!
//! 固定 12 字节，一次 I2C 写事务发出：
//!
//! ```text
//! [0] 0xBB 包头
//! [1] eye-state   [2] reset(保留)  [3] lid   [4] move
//! [5] pos-right   [6] pos-left     [7] blink
//! [8] pupil-right [9] pupil-left   [10] 保留
//! [11] checksum = XOR(bytes[1..=10])
//! ```

pub mod constants;
pub mod packet;
pub mod state;

// 重新导出常用类型
pub use constants::*;
pub use packet::*;
pub use state::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid packet length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid packet header: 0x{header:02X}")]
    InvalidHeader { header: u8 },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i32 },
}
