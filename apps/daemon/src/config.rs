//! 守护进程配置
//!
//! 可选的 TOML 配置文件，所有字段都有默认值：
//!
//! ```toml
//! shm_path = "/dev/shm/simctl_eyes"
//! bus_first = 1
//! bus_last = 2
//! address = 0x42
//! ready_sentinel = 0x01
//! connected_poll_ms = 50
//! disconnected_poll_secs = 10
//! log_dir = "/var/log/eyes-daemon"
//! ```

use anyhow::{Context, Result, bail};
use eyes_driver::{SessionConfig, SyncConfig};
use eyes_protocol::{EYES_I2C_ADDR, EYES_READY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// 共享内存段路径
    pub shm_path: PathBuf,

    /// 扫描的第一条总线
    pub bus_first: u8,

    /// 扫描的最后一条总线（含）
    pub bus_last: u8,

    /// 眼球控制器 7 位地址
    pub address: u16,

    /// 探测读的"就绪"字节
    pub ready_sentinel: u8,

    /// Connected 状态轮询周期（毫秒）
    pub connected_poll_ms: u64,

    /// Disconnected 状态重新扫描周期（秒）
    pub disconnected_poll_secs: u64,

    /// 守护模式下的日志目录
    pub log_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shm_path: PathBuf::from(eyes_shm::DEFAULT_SHM_PATH),
            bus_first: 1,
            bus_last: 2,
            address: EYES_I2C_ADDR,
            ready_sentinel: EYES_READY,
            connected_poll_ms: 50,
            disconnected_poll_secs: 10,
            log_dir: PathBuf::from("/var/log/eyes-daemon"),
        }
    }
}

impl DaemonConfig {
    /// 读取并校验配置文件
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bus_first > self.bus_last {
            bail!(
                "bus_first ({}) must not exceed bus_last ({})",
                self.bus_first,
                self.bus_last
            );
        }
        if self.address > 0x7F {
            bail!("address 0x{:02X} is not a 7-bit I2C address", self.address);
        }
        if self.connected_poll_ms == 0 {
            bail!("connected_poll_ms must be positive");
        }
        if self.disconnected_poll_secs == 0 {
            bail!("disconnected_poll_secs must be positive");
        }
        // 守护模式会把工作目录切到 /
        if !self.shm_path.is_absolute() {
            bail!("shm_path must be absolute, got {}", self.shm_path.display());
        }
        if !self.log_dir.is_absolute() {
            bail!("log_dir must be absolute, got {}", self.log_dir.display());
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address: self.address,
            ready_sentinel: self.ready_sentinel,
            ..Default::default()
        }
        .with_bus_range(self.bus_first, self.bus_last)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            connected_period: Duration::from_millis(self.connected_poll_ms),
            disconnected_period: Duration::from_secs(self.disconnected_poll_secs),
        }
    }
}
