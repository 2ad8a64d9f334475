//! 守护进程主体
//!
//! 附着共享内存、写入启动默认值、运行同步循环直到收到 Ctrl-C。

use crate::config::DaemonConfig;
use anyhow::Result;

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use anyhow::Context;
    use eyes_bus::LinuxI2cConnector;
    use eyes_driver::{DeviceSession, SyncLoop};
    use eyes_shm::{ShmSegment, reset_to_defaults};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::info;

    /// 脱离终端转入后台
    pub fn detach() -> Result<()> {
        nix::unistd::daemon(false, false).context("Failed to daemonize")?;
        Ok(())
    }

    /// 附着共享内存段并写入启动默认值
    pub fn attach_shared(path: &Path) -> Result<Arc<ShmSegment>> {
        let segment = ShmSegment::open_or_create(path)
            .with_context(|| format!("Failed to attach shared memory {}", path.display()))?;
        reset_to_defaults(&segment);
        Ok(Arc::new(segment))
    }

    pub fn run(config: &DaemonConfig) -> Result<()> {
        let shared = attach_shared(&config.shm_path)?;

        let session = DeviceSession::new(
            LinuxI2cConnector::new(),
            Arc::clone(&shared),
            config.session_config(),
        )?;
        let mut sync = SyncLoop::new(session, config.sync_config());

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = Arc::clone(&running);
            ctrlc::set_handler(move || {
                info!("Received interrupt signal, shutting down");
                running.store(false, Ordering::SeqCst);
            })
            .context("Failed to set signal handler")?;
        }

        info!(
            "eyes-daemon started (shm: {}, buses {}..={}, address 0x{:02X})",
            config.shm_path.display(),
            config.bus_first,
            config.bus_last,
            config.address
        );
        sync.run(&running);

        let metrics = sync.metrics().snapshot();
        info!(
            "Shutdown: {} packets sent ({:.1}% success), {} transient failures, {} disconnections, {} reconnections, {} discovery attempts",
            metrics.packets_sent,
            metrics.send_success_rate(),
            metrics.send_failures,
            metrics.disconnections,
            metrics.reconnections,
            metrics.discovery_attempts
        );
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use eyes_shm::SharedState;

        #[test]
        fn test_attach_shared_writes_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("simctl_eyes");

            // 模拟上一次运行残留的状态
            {
                let stale = ShmSegment::open_or_create(&path).unwrap();
                let mut eyes = stale.read_eyes();
                eyes.right.pupil = 12;
                eyes.left.position = 3;
                stale.write_eyes(&eyes);
                stale.set_connected(true);
                stale.set_send_command(true);
            }

            let shared = attach_shared(&path).unwrap();
            let eyes = shared.read_eyes();
            assert_eq!(eyes.right.pupil, 70);
            assert_eq!(eyes.left.pupil, 70);
            assert_eq!(eyes.right.position, 0);
            assert!(!shared.connected());
            assert!(!shared.send_command());
        }

        #[test]
        fn test_attach_shared_rejects_foreign_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("foreign");
            std::fs::write(&path, [0xAAu8; 4]).unwrap();

            let err = attach_shared(&path).unwrap_err();
            assert!(format!("{}", err).contains("Failed to attach shared memory"));
        }
    }
}

#[cfg(target_os = "linux")]
pub use imp::{detach, run};

#[cfg(not(target_os = "linux"))]
pub fn detach() -> Result<()> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn run(_config: &DaemonConfig) -> Result<()> {
    anyhow::bail!("eyes-daemon requires Linux (i2c-dev and POSIX shared memory)")
}
