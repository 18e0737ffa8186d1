//! 会话 Builder
//!
//! 提供链式 API 创建 [`Session`]。

use crate::client::Session;
use rotator_driver::ConnectionConfig;
use std::time::Duration;

/// 会话 Builder
///
/// # 示例
///
/// ```rust,no_run
/// use rotator_client::SessionBuilder;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = SessionBuilder::new()
///     .host("192.168.0.10")
///     .port(5570)
///     .connect_timeout(Duration::from_secs(3))
///     .build();
/// session.connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: ConnectionConfig,
    simulation_mode: bool,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从完整的连接配置开始
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            simulation_mode: false,
        }
    }

    /// 控制器地址（默认: 127.0.0.1）
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// 控制器端口（默认: 5570）
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// 连接超时（默认: 10 秒）
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// 遥测标称周期（默认: 50ms），决定停滞与 stale 判定
    pub fn telemetry_period(mut self, period: Duration) -> Self {
        self.config.telemetry_period = period;
        self
    }

    /// 无帧多少个周期后判定连接丢失（默认: 5）
    pub fn stall_factor(mut self, factor: u32) -> Self {
        self.config.stall_factor = factor;
        self
    }

    /// 命令等待结果的最长时间（默认: 5 秒）
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// 连续多少帧损坏后上报数据完整性下降（默认: 3）
    pub fn malformed_threshold(mut self, threshold: u32) -> Self {
        self.config.malformed_threshold = threshold;
        self
    }

    /// 仿真模式：`connect` 时启动内部模拟控制器并连接到它，忽略 host/port
    pub fn simulation_mode(mut self, enabled: bool) -> Self {
        self.simulation_mode = enabled;
        self
    }

    /// 构建会话（不会立即连接）
    pub fn build(self) -> Session {
        Session::new(self.config, self.simulation_mode)
    }
}
