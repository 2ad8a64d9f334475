//! # Eyes Bus Adapter Layer
//!
//! I2C 硬件抽象层，把总线能力收敛成两个 trait：
//!
//! - [`BusConnector`]: 按总线编号打开设备并绑定从机地址
//! - [`BusAdapter`]: 已打开的总线句柄，提供 1 字节探测读和整包写事务
//!
//! 句柄的关闭由 `Drop` 完成，持有者只需丢弃句柄即可保证恰好释放一次。

use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod i2c;

#[cfg(target_os = "linux")]
pub use i2c::{LinuxI2cAdapter, LinuxI2cConnector};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockAdapter, MockBus};

/// 总线层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] BusDeviceError),
}

impl BusError {
    /// 是否为"设备已从总线上消失"类错误
    ///
    /// 这类错误需要把会话降级为 absent；其余传输错误只在下个周期重试。
    pub fn is_disconnect(&self) -> bool {
        match self {
            BusError::Io(e) => e.raw_os_error().is_some_and(is_disconnect_errno),
            BusError::Device(e) => e.is_disconnect(),
        }
    }
}

/// 断连类 errno：远端 IO 错误（无 ACK）、设备不存在
#[cfg(target_os = "linux")]
fn is_disconnect_errno(errno: i32) -> bool {
    matches!(errno, libc::EREMOTEIO | libc::ENODEV | libc::ENXIO)
}

#[cfg(not(target_os = "linux"))]
fn is_disconnect_errno(errno: i32) -> bool {
    matches!(errno, libc::ENODEV | libc::ENXIO)
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDeviceErrorKind {
    Unknown,
    NoDevice,
    RemoteIo,
    Busy,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct BusDeviceError {
    pub kind: BusDeviceErrorKind,
    pub message: String,
}

impl BusDeviceError {
    pub fn new(kind: BusDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(
            self.kind,
            BusDeviceErrorKind::NoDevice | BusDeviceErrorKind::RemoteIo
        )
    }
}

impl From<String> for BusDeviceError {
    fn from(message: String) -> Self {
        Self::new(BusDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for BusDeviceError {
    fn from(message: &str) -> Self {
        Self::new(BusDeviceErrorKind::Unknown, message)
    }
}

/// 已打开并绑定从机地址的总线句柄
pub trait BusAdapter {
    /// 1 字节读事务，返回读到的字节
    fn probe(&mut self, address: u16) -> Result<u8, BusError>;

    /// 单次写事务，整包原子发出
    fn transact(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError>;

    /// 句柄所在的总线编号
    fn bus(&self) -> u8;
}

/// 总线打开器
///
/// `open` 打开 `bus` 号总线并绑定 `address`，失败时句柄已被释放。
pub trait BusConnector {
    type Adapter: BusAdapter;

    fn open(&mut self, bus: u8, address: u16) -> Result<Self::Adapter, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_device_error_display() {
        let err = BusDeviceError::new(BusDeviceErrorKind::RemoteIo, "no ack");
        assert_eq!(format!("{}", err), "RemoteIo: no ack");

        let err: BusDeviceError = "plain".into();
        assert_eq!(err.kind, BusDeviceErrorKind::Unknown);
    }

    #[test]
    fn test_device_error_disconnect_classification() {
        let device = |kind| BusError::from(BusDeviceError::new(kind, "test"));

        assert!(device(BusDeviceErrorKind::RemoteIo).is_disconnect());
        assert!(device(BusDeviceErrorKind::NoDevice).is_disconnect());
        assert!(!device(BusDeviceErrorKind::Busy).is_disconnect());
        assert!(!device(BusDeviceErrorKind::Unknown).is_disconnect());
    }

    #[test]
    fn test_io_error_disconnect_classification() {
        assert!(BusError::Io(io::Error::from_raw_os_error(libc::ENODEV)).is_disconnect());
        assert!(BusError::Io(io::Error::from_raw_os_error(libc::ENXIO)).is_disconnect());
        assert!(!BusError::Io(io::Error::from_raw_os_error(libc::EAGAIN)).is_disconnect());
        assert!(!BusError::Io(io::Error::from_raw_os_error(libc::ETIMEDOUT)).is_disconnect());
        // 非 OS 错误不算断连
        assert!(!BusError::Io(io::Error::other("synthetic")).is_disconnect());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_remote_io_is_disconnect() {
        // EREMOTEIO (121): 从机未应答
        assert_eq!(libc::EREMOTEIO, 121);
        assert!(BusError::Io(io::Error::from_raw_os_error(libc::EREMOTEIO)).is_disconnect());
    }
}
