//! 进程内共享状态实现
//!
//! 与 `ShmSegment` 语义一致，但全部存放在进程内存中。
//! 测试通过它扮演"外部写入方"：修改眼球字段、置位 `send_command`、
//! 观察 `connected`，以及注入总线互斥量获取失败。

use crate::{SharedState, ShmError};
use eyes_protocol::EyesState;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MemorySharedState {
    eyes: Mutex<EyesState>,
    connected: AtomicBool,
    send_command: AtomicBool,

    bus_locked: Mutex<bool>,
    bus_released: Condvar,
    fail_locks: AtomicU64,
    lock_count: AtomicU64,
}

impl MemorySharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定眼球状态初始化
    pub fn with_eyes(eyes: EyesState) -> Self {
        let state = Self::new();
        state.write_eyes(&eyes);
        state
    }

    /// 就地修改眼球字段（模拟外部写入方）
    pub fn update_eyes(&self, f: impl FnOnce(&mut EyesState)) {
        f(&mut self.eyes.lock());
    }

    /// 接下来 `count` 次获取总线互斥量失败
    pub fn fail_next_locks(&self, count: u64) {
        self.fail_locks.store(count, Ordering::SeqCst);
    }

    pub fn is_bus_locked(&self) -> bool {
        *self.bus_locked.lock()
    }

    /// 成功获取总线互斥量的累计次数
    pub fn bus_lock_count(&self) -> u64 {
        self.lock_count.load(Ordering::Relaxed)
    }
}

impl SharedState for MemorySharedState {
    fn read_eyes(&self) -> EyesState {
        *self.eyes.lock()
    }

    fn write_eyes(&self, eyes: &EyesState) {
        *self.eyes.lock() = *eyes;
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn send_command(&self) -> bool {
        self.send_command.load(Ordering::SeqCst)
    }

    fn set_send_command(&self, pending: bool) {
        self.send_command.store(pending, Ordering::SeqCst);
    }

    fn lock_bus(&self) -> Result<(), ShmError> {
        let injected = self
            .fail_locks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(ShmError::LockUnavailable);
        }

        let mut locked = self.bus_locked.lock();
        while *locked {
            self.bus_released.wait(&mut locked);
        }
        *locked = true;
        self.lock_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn unlock_bus(&self) {
        *self.bus_locked.lock() = false;
        self.bus_released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusGuard;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let state = MemorySharedState::new();
        assert_eq!(state.read_eyes().right.pupil, 70);
        assert_eq!(state.read_eyes().left.pupil, 70);
        assert!(!state.connected());
        assert!(!state.send_command());
    }

    #[test]
    fn test_update_eyes() {
        let state = MemorySharedState::new();
        state.update_eyes(|eyes| eyes.left.lid = 2);
        assert_eq!(state.read_eyes().left.lid, 2);
        assert_eq!(state.read_eyes().right.lid, 0);
    }

    #[test]
    fn test_injected_lock_failures() {
        let state = MemorySharedState::new();
        state.fail_next_locks(2);

        assert!(matches!(state.lock_bus(), Err(ShmError::LockUnavailable)));
        assert!(matches!(
            BusGuard::acquire(&state),
            Err(ShmError::LockUnavailable)
        ));
        assert!(!state.is_bus_locked());

        let guard = BusGuard::acquire(&state).unwrap();
        assert!(state.is_bus_locked());
        drop(guard);
        assert_eq!(state.bus_lock_count(), 1);
    }

    #[test]
    fn test_bus_lock_is_exclusive() {
        let state = Arc::new(MemorySharedState::new());
        state.lock_bus().unwrap();

        let contender = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let _guard = BusGuard::acquire(&*state).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(state.bus_lock_count(), 1);

        state.unlock_bus();
        contender.join().unwrap();
        assert_eq!(state.bus_lock_count(), 2);
        assert!(!state.is_bus_locked());
    }
}
