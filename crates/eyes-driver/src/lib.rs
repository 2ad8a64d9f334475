//! # Eyes Driver
//!
//! 眼球控制器驱动层：
//! - [`DeviceSession`]: 发现控制器、持有总线句柄、构包并发送
//! - [`SyncLoop`]: 对账共享状态与已发送快照，执行 Connected/Disconnected 重连策略
//! - [`SyncMetrics`]: 发送、失败、断连、重连计数
//!
//! 总线后端与共享状态都以句柄形式在构造时注入，测试使用
//! `eyes_bus::MockBus` 与 `eyes_shm::MemorySharedState`。

mod error;
pub mod metrics;
pub mod session;
pub mod sync;

pub use error::{DriverError, SendError};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use session::{DeviceSession, SessionConfig};
pub use sync::{LinkState, SyncConfig, SyncLoop};
