//! 日志初始化
//!
//! - 调试模式：输出到 stderr
//! - 守护模式：经 `tracing-appender` 非阻塞写入按天轮转的日志文件
//!
//! 依赖库通过 `log` 发出的记录由 `tracing-log` 桥接。

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const CRATES: &[&str] = &["eyes_daemon", "eyes_driver", "eyes_shm", "eyes_bus"];

/// 未设置 `RUST_LOG` 时使用的过滤规则
fn default_directives(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// `env` 为 `RUST_LOG` 的值；缺失或无法解析时回退到默认规则
fn build_filter(env: Option<&str>, debug: bool) -> EnvFilter {
    env.filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(debug)))
}

/// 安装全局 subscriber
///
/// 守护模式返回的 guard 必须持有到进程退出，否则缓冲中的日志会丢失。
pub fn init(debug: bool, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let builder = tracing_subscriber::fmt().with_env_filter(build_filter(env.as_deref(), debug));

    if debug {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to install tracing subscriber")?;
        return Ok(None);
    }

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("eyes-daemon")
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to open log file in {}", log_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = builder.with_writer(writer).with_ansi(false).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(Some(guard))
}

/// 调试模式下先经由 tracing 记录 panic，再交给默认 hook
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Daemon panicked: {}", info);
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    fn enabled_under(filter: EnvFilter, check: impl FnOnce() -> bool) -> bool {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(subscriber, check)
    }

    #[test]
    fn test_rust_log_enables_driver_debug() {
        let filter = build_filter(Some("eyes_driver=debug"), false);
        assert!(enabled_under(filter, || tracing::enabled!(
            target: "eyes_driver::session",
            Level::DEBUG
        )));
    }

    #[test]
    fn test_rust_log_replaces_defaults() {
        let filter = build_filter(Some("eyes_bus=error"), false);
        assert!(!enabled_under(filter, || tracing::enabled!(
            target: "eyes_bus::i2c",
            Level::WARN
        )));
    }

    #[test]
    fn test_default_covers_all_crates() {
        let warn_enabled = |check: fn() -> bool| enabled_under(build_filter(None, false), check);
        assert!(warn_enabled(|| tracing::enabled!(target: "eyes_daemon::daemon", Level::WARN)));
        assert!(warn_enabled(|| tracing::enabled!(target: "eyes_driver::sync", Level::WARN)));
        assert!(warn_enabled(|| tracing::enabled!(target: "eyes_shm::segment", Level::WARN)));
        assert!(warn_enabled(|| tracing::enabled!(target: "eyes_bus::i2c", Level::WARN)));

        let filter = build_filter(None, false);
        assert!(!enabled_under(filter, || tracing::enabled!(
            target: "eyes_driver::session",
            Level::DEBUG
        )));
    }

    #[test]
    fn test_debug_mode_defaults_to_debug_level() {
        let filter = build_filter(None, true);
        assert!(enabled_under(filter, || tracing::enabled!(
            target: "eyes_driver::session",
            Level::DEBUG
        )));
    }

    #[test]
    fn test_unusable_rust_log_falls_back() {
        for env in ["", "   ", "eyes_driver=loud"] {
            let filter = build_filter(Some(env), false);
            assert!(enabled_under(filter, || tracing::enabled!(
                target: "eyes_shm::segment",
                Level::INFO
            )));
        }
    }
}
