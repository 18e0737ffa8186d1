//! 日志初始化
//!
//! 库内部统一使用 `tracing` 宏；`log` crate 的记录通过 `tracing-log` 桥接。
//! `RUST_LOG` 环境变量存在时优先于传入的级别。

use log::LevelFilter;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Failed to install log bridge: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 安装全局日志订阅者
///
/// 每个进程只能成功调用一次，重复调用返回错误。
pub fn init_logger(level: LevelFilter) -> Result<(), LoggerError> {
    tracing_log::LogTracer::init_with_filter(level)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// 按配置文件中的级别初始化
pub fn init_from_config(config: &crate::config::SessionConfig) -> Result<(), crate::SdkError> {
    let level = config.log_level()?;
    init_logger(level)?;
    Ok(())
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_logger_only_once() {
        // 同一测试进程中第一次安装可能已由其他测试完成
        let _ = init_logger(LevelFilter::Debug);
        assert!(init_logger(LevelFilter::Info).is_err());

        tracing::info!("logger installed");
        log::info!("log records are bridged");
    }

    #[test]
    #[serial]
    fn test_env_filter_falls_back_to_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter(LevelFilter::Warn).to_string(), "warn");
        }
    }
}
