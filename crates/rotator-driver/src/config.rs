//! 连接配置

use std::time::Duration;

/// 控制器默认命令/遥测端口
pub const DEFAULT_PORT: u16 = 5570;

/// 连接配置
///
/// 会话启动后不可变；所有时间参数都基于单调时钟。
///
/// # Example
///
/// ```
/// use rotator_driver::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig {
///     host: "192.168.1.20".to_string(),
///     connect_timeout: Duration::from_secs(3),
///     ..Default::default()
/// };
/// assert_eq!(config.port, 5570);
/// assert_eq!(config.stall_timeout(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// TCP 连接超时
    pub connect_timeout: Duration,
    /// 遥测的名义周期（控制器约 20 Hz）
    pub telemetry_period: Duration,
    /// 超过 `stall_factor × telemetry_period` 没有收到完整帧即判定连接丢失
    pub stall_factor: u32,
    /// 帧间隔超过 `stale_factor × telemetry_period` 时样本标记为 stale
    pub stale_factor: u32,
    /// 连续损坏帧数超过该值时上报数据完整性下降
    pub malformed_threshold: u32,
    /// 命令等待确认的截止时间
    pub command_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            telemetry_period: Duration::from_millis(50),
            stall_factor: 5,
            stale_factor: 2,
            malformed_threshold: 3,
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stall_timeout(&self) -> Duration {
        self.telemetry_period * self.stall_factor
    }

    pub fn stale_threshold(&self) -> Duration {
        self.telemetry_period * self.stale_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.address(), "127.0.0.1:5570");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.stall_timeout(), Duration::from_millis(250));
        assert_eq!(config.stale_threshold(), Duration::from_millis(100));
    }

    #[test]
    fn test_new_keeps_tuning_defaults() {
        let config = ConnectionConfig::new("rotator.local", 6000);
        assert_eq!(config.address(), "rotator.local:6000");
        assert_eq!(config.malformed_threshold, 3);
        assert_eq!(config.command_timeout, Duration::from_secs(5));
    }
}
