//! # 会话配置
//!
//! 从 TOML 加载连接、遥测、命令与日志设置。所有字段均可省略，
//! 省略时使用与控制器 GUI 相同的默认值（127.0.0.1:5570，连接超时 10 秒，日志 info）。
//!
//! ```toml
//! simulation_mode = false
//!
//! [connection]
//! host = "192.168.0.10"
//! port = 5570
//! connect_timeout_secs = 10.0
//!
//! [telemetry]
//! period_secs = 0.05
//! stall_factor = 5
//! stale_factor = 2
//! malformed_threshold = 3
//!
//! [command]
//! timeout_secs = 5.0
//!
//! [logging]
//! level = "info"
//! ```

use log::LevelFilter;
use rotator_client::{Session, SessionBuilder};
use rotator_driver::{ConnectionConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 连接内部模拟控制器而不是真实硬件
    pub simulation_mode: bool,
    pub connection: ConnectionSection,
    pub telemetry: TelemetrySection,
    pub command: CommandSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// 遥测标称周期（s）
    pub period_secs: f64,
    /// 无帧多少个周期后判定连接丢失
    pub stall_factor: u32,
    /// 帧间隔超过多少个周期时标记为 stale
    pub stale_factor: u32,
    /// 连续多少帧损坏后上报数据完整性下降
    pub malformed_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSection {
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// off / error / warn / info / debug / trace
    pub level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            simulation_mode: false,
            connection: ConnectionSection::default(),
            telemetry: TelemetrySection::default(),
            command: CommandSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for ConnectionSection {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            host: defaults.host,
            port: DEFAULT_PORT,
            connect_timeout_secs: defaults.connect_timeout.as_secs_f64(),
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            period_secs: defaults.telemetry_period.as_secs_f64(),
            stall_factor: defaults.stall_factor,
            stale_factor: defaults.stale_factor,
            malformed_threshold: defaults.malformed_threshold,
        }
    }
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            timeout_secs: ConnectionConfig::default().command_timeout.as_secs_f64(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// 从文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.host.trim().is_empty() && !self.simulation_mode {
            return Err(invalid("connection.host", "must not be empty"));
        }
        if self.connection.port == 0 && !self.simulation_mode {
            return Err(invalid("connection.port", "must not be 0"));
        }
        positive_secs("connection.connect_timeout_secs", self.connection.connect_timeout_secs)?;
        positive_secs("telemetry.period_secs", self.telemetry.period_secs)?;
        positive_secs("command.timeout_secs", self.command.timeout_secs)?;
        if self.telemetry.stall_factor == 0 {
            return Err(invalid("telemetry.stall_factor", "must be at least 1"));
        }
        if self.telemetry.stale_factor == 0 {
            return Err(invalid("telemetry.stale_factor", "must be at least 1"));
        }
        self.log_level()?;
        Ok(())
    }

    /// 解析后的日志级别
    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(self.logging.level.trim())
            .map_err(|_| invalid("logging.level", format!("unknown level '{}'", self.logging.level)))
    }

    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.connection.host.clone(),
            port: self.connection.port,
            connect_timeout: Duration::from_secs_f64(self.connection.connect_timeout_secs),
            telemetry_period: Duration::from_secs_f64(self.telemetry.period_secs),
            stall_factor: self.telemetry.stall_factor,
            stale_factor: self.telemetry.stale_factor,
            malformed_threshold: self.telemetry.malformed_threshold,
            command_timeout: Duration::from_secs_f64(self.command.timeout_secs),
        }
    }

    /// 按配置创建会话（不会立即连接）
    pub fn build_session(&self) -> Session {
        SessionBuilder::with_config(self.to_connection_config())
            .simulation_mode(self.simulation_mode)
            .build()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be a positive number of seconds", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());

        let conn = config.to_connection_config();
        assert_eq!(conn, ConnectionConfig::default());
        assert_eq!(conn.port, 5570);
        assert_eq!(conn.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level().unwrap(), LevelFilter::Info);
    }

    #[test]
    fn test_partial_document() {
        let config = SessionConfig::from_toml_str(
            r#"
simulation_mode = true

[connection]
host = "10.1.2.3"

[telemetry]
period_secs = 0.02
stall_factor = 10

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert!(config.simulation_mode);
        let conn = config.to_connection_config();
        assert_eq!(conn.address(), "10.1.2.3:5570");
        assert_eq!(conn.telemetry_period, Duration::from_millis(20));
        assert_eq!(conn.stall_timeout(), Duration::from_millis(200));
        assert_eq!(config.log_level().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = SessionConfig::from_toml_str("[telemetry]\nperiod_secs = 0.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "telemetry.period_secs",
                ..
            }
        ));

        let err = SessionConfig::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("logging.level"));

        assert!(matches!(
            SessionConfig::from_toml_str("[connection]\nport = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = SessionConfig::default();
        config.connection.host = "rotator.local".into();
        config.command.timeout_secs = 2.5;

        let text = config.to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::load_from_file("/nonexistent/rotator.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
