//! 驱动层错误类型定义

use eyes_bus::BusError;
use eyes_shm::ShmError;
use thiserror::Error;

/// 单次发送的失败原因
///
/// 三者都不会终止进程：调用方根据会话是否仍 present 决定重试或降级。
#[derive(Error, Debug)]
pub enum SendError {
    /// 没有打开的总线句柄（设备未发现或已降级）
    #[error("Eyes not present")]
    NotPresent,

    /// 总线互斥量获取失败（瞬时，不降级）
    #[error("Bus lock failed: {0}")]
    Lock(#[source] ShmError),

    /// 写事务失败
    #[error("Transport failure: {0}")]
    Transport(#[source] BusError),
}

impl SendError {
    /// 是否为断连类传输错误
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SendError::Transport(e) if e.is_disconnect())
    }
}

/// 驱动层错误类型
///
/// 只在构造会话时出现；运行期的发送失败由 [`SendError`] 描述并在循环内消化。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 无效配置
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyes_bus::{BusDeviceError, BusDeviceErrorKind};

    #[test]
    fn test_send_error_display() {
        assert_eq!(format!("{}", SendError::NotPresent), "Eyes not present");

        let err = SendError::Lock(ShmError::LockUnavailable);
        assert_eq!(format!("{}", err), "Bus lock failed: Bus lock unavailable");

        let err = SendError::Transport(
            BusDeviceError::new(BusDeviceErrorKind::RemoteIo, "no ack").into(),
        );
        let msg = format!("{}", err);
        assert!(msg.contains("Transport failure"), "{}", msg);
        assert!(msg.contains("no ack"), "{}", msg);
    }

    #[test]
    fn test_send_error_disconnect_classification() {
        let remote = SendError::Transport(
            BusDeviceError::new(BusDeviceErrorKind::RemoteIo, "gone").into(),
        );
        let busy =
            SendError::Transport(BusDeviceError::new(BusDeviceErrorKind::Busy, "busy").into());

        assert!(remote.is_disconnect());
        assert!(!busy.is_disconnect());
        assert!(!SendError::NotPresent.is_disconnect());
        assert!(!SendError::Lock(ShmError::LockUnavailable).is_disconnect());
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::InvalidConfig("no candidate buses".into());
        assert_eq!(
            format!("{}", err),
            "Invalid configuration: no candidate buses"
        );
    }
}
