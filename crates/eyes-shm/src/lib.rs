//! # Eyes Shared State
//!
//! 与仿真管理进程共享的状态句柄。
//!
//! 本 crate 只关心共享段里与眼球相关的部分：
//! - `eyes` 子结构（12 个状态字段、`connected`、`send_command`）
//! - 保护 I2C 总线的进程间互斥量（Bus Mutex）
//!
//! 所有访问都经过 [`SharedState`] trait，组件在构造时注入句柄，
//! 不假设任何全局单例；测试使用 [`MemorySharedState`] 替身。
//!
//! ## 后端
//!
//! - [`MemorySharedState`]: 进程内实现（所有平台）
//! - `ShmSegment`: 基于 `/dev/shm` 文件映射 + 进程共享 POSIX 信号量（仅 Linux）

use eyes_protocol::EyesState;
use thiserror::Error;

mod memory;
#[cfg(target_os = "linux")]
mod segment;

pub use memory::MemorySharedState;
#[cfg(target_os = "linux")]
pub use segment::{SEGMENT_MAGIC, SEGMENT_VERSION, ShmSegment};

/// 默认共享内存段路径
pub const DEFAULT_SHM_PATH: &str = "/dev/shm/simctl_eyes";

/// 共享状态错误类型
#[derive(Error, Debug)]
pub enum ShmError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Segment too small: {actual} bytes (need at least {required})")]
    TooSmall { required: usize, actual: usize },

    #[error("Invalid segment magic: 0x{0:08X}")]
    BadMagic(u32),

    #[error("Unsupported segment version: {0}")]
    BadVersion(u32),

    #[error("Bus semaphore error: {0}")]
    Semaphore(std::io::Error),

    #[error("Bus lock unavailable")]
    LockUnavailable,
}

/// 共享状态句柄
///
/// 眼球字段的读写不加锁：外部写入方可能在一次读取中途修改，
/// 同步循环下一周期会读到一致的值。
pub trait SharedState {
    /// 读取 12 个眼球状态字段
    fn read_eyes(&self) -> EyesState;

    /// 写入 12 个眼球状态字段
    fn write_eyes(&self, eyes: &EyesState);

    fn connected(&self) -> bool;

    fn set_connected(&self, connected: bool);

    /// 一次性"强制重发"标志
    fn send_command(&self) -> bool;

    fn set_send_command(&self, pending: bool);

    /// 获取总线互斥量（阻塞），优先使用 [`BusGuard::acquire`]
    fn lock_bus(&self) -> Result<(), ShmError>;

    /// 释放总线互斥量
    fn unlock_bus(&self);
}

/// 总线互斥量守卫
///
/// 只覆盖一次事务（一次探测读或一次整包写），drop 时释放。
#[must_use = "the bus is released as soon as the guard is dropped"]
pub struct BusGuard<'a, S: SharedState + ?Sized> {
    state: &'a S,
}

impl<'a, S: SharedState + ?Sized> BusGuard<'a, S> {
    pub fn acquire(state: &'a S) -> Result<Self, ShmError> {
        state.lock_bus()?;
        Ok(Self { state })
    }
}

impl<S: SharedState + ?Sized> Drop for BusGuard<'_, S> {
    fn drop(&mut self) {
        self.state.unlock_bus();
    }
}

impl<T: SharedState + ?Sized> SharedState for std::sync::Arc<T> {
    fn read_eyes(&self) -> EyesState {
        (**self).read_eyes()
    }

    fn write_eyes(&self, eyes: &EyesState) {
        (**self).write_eyes(eyes)
    }

    fn connected(&self) -> bool {
        (**self).connected()
    }

    fn set_connected(&self, connected: bool) {
        (**self).set_connected(connected)
    }

    fn send_command(&self) -> bool {
        (**self).send_command()
    }

    fn set_send_command(&self, pending: bool) {
        (**self).set_send_command(pending)
    }

    fn lock_bus(&self) -> Result<(), ShmError> {
        (**self).lock_bus()
    }

    fn unlock_bus(&self) {
        (**self).unlock_bus()
    }
}

/// 写入守护进程启动默认值
///
/// 全部 normal/open/center，瞳孔 70%，`connected`/`send_command` 清零。
pub fn reset_to_defaults<S: SharedState + ?Sized>(state: &S) {
    state.set_connected(false);
    state.write_eyes(&EyesState::default());
    state.set_send_command(false);
}
