//! 同步循环
//!
//! 把共享内存中的眼球状态与上次发出的快照对账，并执行重连策略。
//!
//! ```text
//!            discover() 成功
//! Disconnected ───────────────► Connected { resend_pending: true }
//!      ▲                              │ 发送成功 → resend_pending = false
//!      └──────── 断连类错误 ───────────┘
//! ```
//!
//! 单线程协作式调度：`tick()` 执行一次迭代并返回下次迭代前应等待的时长，
//! 总线互斥量只在单次事务内持有，从不跨越等待。

use crate::metrics::SyncMetrics;
use crate::session::DeviceSession;
use eyes_bus::BusConnector;
use eyes_protocol::EyesState;
use eyes_shm::SharedState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 等待期间检查退出标志的最大间隔
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// 轮询周期配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Connected 状态下的轮询周期
    pub connected_period: Duration,
    /// Disconnected 状态下的重新扫描周期
    pub disconnected_period: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connected_period: Duration::from_millis(50),
            disconnected_period: Duration::from_secs(10),
        }
    }
}

/// 链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// `resend_pending` 为真时，下一个 Connected 周期无条件发送完整状态
    Connected { resend_pending: bool },
}

impl LinkState {
    pub fn on_discovered(self) -> Self {
        LinkState::Connected {
            resend_pending: true,
        }
    }

    pub fn on_lost(self) -> Self {
        LinkState::Disconnected
    }

    pub fn on_sent(self) -> Self {
        match self {
            LinkState::Connected { .. } => LinkState::Connected {
                resend_pending: false,
            },
            LinkState::Disconnected => LinkState::Disconnected,
        }
    }

    pub fn poll_period(&self, config: &SyncConfig) -> Duration {
        match self {
            LinkState::Connected { .. } => config.connected_period,
            LinkState::Disconnected => config.disconnected_period,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected { .. })
    }
}

/// 同步循环
///
/// # 示例
///
/// ```no_run
/// # #[cfg(target_os = "linux")]
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use eyes_bus::LinuxI2cConnector;
/// use eyes_driver::{DeviceSession, SessionConfig, SyncConfig, SyncLoop};
/// use eyes_shm::{ShmSegment, DEFAULT_SHM_PATH};
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
///
/// let shared = Arc::new(ShmSegment::open_or_create(DEFAULT_SHM_PATH)?);
/// let session = DeviceSession::new(LinuxI2cConnector::new(), shared, SessionConfig::default())?;
/// let mut sync = SyncLoop::new(session, SyncConfig::default());
///
/// let running = AtomicBool::new(true);
/// sync.run(&running);
/// # Ok(())
/// # }
/// # #[cfg(not(target_os = "linux"))]
/// # fn main() {}
/// ```
pub struct SyncLoop<C: BusConnector, S: SharedState> {
    session: DeviceSession<C, S>,
    shared: Arc<S>,
    config: SyncConfig,
    link: LinkState,
    /// 上次成功发出的眼球状态
    snapshot: EyesState,
    metrics: Arc<SyncMetrics>,
}

impl<C: BusConnector, S: SharedState> SyncLoop<C, S> {
    pub fn new(session: DeviceSession<C, S>, config: SyncConfig) -> Self {
        let shared = Arc::clone(session.shared());
        Self {
            session,
            shared,
            config,
            link: LinkState::Disconnected,
            snapshot: EyesState::default(),
            metrics: Arc::new(SyncMetrics::new()),
        }
    }

    /// 首次发现
    ///
    /// 找到设备时立即无条件发送一次当前状态；快照总是取自当前共享状态。
    pub fn startup(&mut self) {
        let live = self.shared.read_eyes();
        self.snapshot = live;

        SyncMetrics::inc(&self.metrics.discovery_attempts);
        if self.session.discover() {
            self.shared.set_connected(true);
            self.link = self.link.on_discovered();
            self.push(live);
        } else {
            self.shared.set_connected(false);
            self.link = self.link.on_lost();
            info!(
                "Eyes not found, rescanning every {:?}",
                self.config.disconnected_period
            );
        }
    }

    /// 执行一次迭代，返回下次迭代前的等待时长
    pub fn tick(&mut self) -> Duration {
        match self.link {
            LinkState::Disconnected => {
                self.shared.set_connected(false);
                SyncMetrics::inc(&self.metrics.discovery_attempts);

                if self.session.discover() {
                    info!("Eyes reconnected");
                    SyncMetrics::inc(&self.metrics.reconnections);
                    self.shared.set_connected(true);
                    self.link = self.link.on_discovered();
                } else {
                    debug!("Eyes still not found");
                }
            },
            LinkState::Connected { resend_pending } => {
                let live = self.shared.read_eyes();
                if resend_pending || self.shared.send_command() || live != self.snapshot {
                    self.push(live);
                }
            },
        }

        self.link.poll_period(&self.config)
    }

    /// `startup()` 后循环执行 `tick()`，直到 `running` 被清除
    ///
    /// 退出标志只在两次迭代之间检查。
    pub fn run(&mut self, running: &AtomicBool) {
        self.startup();

        let mut period = self.link.poll_period(&self.config);
        while running.load(Ordering::SeqCst) {
            if !sleep_while_running(period, running) {
                break;
            }
            period = self.tick();
        }

        debug!("Sync loop stopped");
    }

    fn push(&mut self, live: EyesState) {
        match self.session.send_full_state(&live) {
            Ok(()) => {
                SyncMetrics::inc(&self.metrics.packets_sent);
                self.snapshot = live;
                self.shared.set_send_command(false);
                self.link = self.link.on_sent();
            },
            Err(e) if !self.session.is_present() => {
                warn!("Eyes disconnected: {}", e);
                SyncMetrics::inc(&self.metrics.disconnections);
                self.shared.set_connected(false);
                self.link = self.link.on_lost();
            },
            Err(e) => {
                SyncMetrics::inc(&self.metrics.send_failures);
                warn!("Failed to send eyes state, retrying next tick: {}", e);
            },
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn snapshot(&self) -> &EyesState {
        &self.snapshot
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub fn session(&self) -> &DeviceSession<C, S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DeviceSession<C, S> {
        &mut self.session
    }

    pub fn shared(&self) -> &Arc<S> {
        &self.shared
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// 分片等待 `period`，期间 `running` 被清除则提前返回 `false`
fn sleep_while_running(period: Duration, running: &AtomicBool) -> bool {
    let mut remaining = period;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(SHUTDOWN_CHECK_INTERVAL);
        spin_sleep::sleep(slice);
        remaining -= slice;
    }
    running.load(Ordering::SeqCst)
}
