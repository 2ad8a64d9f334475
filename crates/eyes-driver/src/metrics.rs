//! 同步循环指标
//!
//! 原子计数器，守护进程退出时记录一次快照。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// 成功写出的命令包数
    pub packets_sent: AtomicU64,

    /// 瞬时发送失败次数（未降级）
    pub send_failures: AtomicU64,

    /// 断连次数（Connected -> Disconnected）
    pub disconnections: AtomicU64,

    /// 重连次数（不含启动时的首次发现）
    pub reconnections: AtomicU64,

    /// 发现扫描次数
    pub discovery_attempts: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            disconnections: self.disconnections.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            discovery_attempts: self.discovery_attempts.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub send_failures: u64,
    pub disconnections: u64,
    pub reconnections: u64,
    pub discovery_attempts: u64,
}

impl MetricsSnapshot {
    /// 发送成功率（百分比）
    ///
    /// 没有任何发送尝试时返回 100.0。
    pub fn send_success_rate(&self) -> f64 {
        let attempts = self.packets_sent + self.send_failures + self.disconnections;
        if attempts == 0 {
            return 100.0;
        }
        (self.packets_sent as f64 / attempts as f64) * 100.0
    }
}
