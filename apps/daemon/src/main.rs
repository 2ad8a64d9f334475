//! 眼球同步守护进程主入口
//!
//! 把仿真管理进程写入共享内存的眼球状态同步到 I2C 总线上的眼球控制器。

mod config;
mod daemon;
mod logging;

use anyhow::Result;
use clap::Parser;
use config::DaemonConfig;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;

/// OVS 眼球同步守护进程
#[derive(Parser, Debug)]
#[command(name = "eyes-daemon")]
#[command(about = "Keeps the OVS eyes controller in sync with simulator shared memory", long_about = None)]
struct Args {
    /// 前台运行，日志输出到 stderr，并捕获 panic
    #[arg(short, long)]
    debug: bool,

    /// TOML 配置文件（可选，缺省字段使用默认值）
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<DaemonConfig> {
    match path {
        Some(path) => DaemonConfig::load(path),
        None => Ok(DaemonConfig::default()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unusable configuration: {:#}", e);
            return ExitCode::from(2);
        },
    };

    // 必须在日志线程启动之前 fork
    if !args.debug
        && let Err(e) = daemon::detach()
    {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let _log_guard = match logging::init(args.debug, &config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    let result = if args.debug {
        logging::install_panic_hook();
        match panic::catch_unwind(AssertUnwindSafe(|| daemon::run(&config))) {
            Ok(result) => result,
            Err(_) => return ExitCode::from(101),
        }
    } else {
        daemon::run(&config)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["eyes-daemon"]).unwrap();
        assert!(!args.debug);
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["eyes-daemon", "-d", "-c", "/etc/eyes.toml"]).unwrap();
        assert!(args.debug);
        assert_eq!(args.config, Some(PathBuf::from("/etc/eyes.toml")));

        let args = Args::try_parse_from(["eyes-daemon", "--debug", "--config", "x.toml"]).unwrap();
        assert!(args.debug);

        assert!(Args::try_parse_from(["eyes-daemon", "--bogus"]).is_err());
    }

    #[test]
    fn test_load_config_without_path() {
        assert_eq!(load_config(None).unwrap(), DaemonConfig::default());
    }
}
