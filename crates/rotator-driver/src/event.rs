//! 连接层事件
//!
//! IO 线程把解码后的数据以 [`DriverEvent`] 的形式交给上层回调。

use crate::stats::RateSnapshot;
use rotator_protocol::{Acknowledgment, ControllerConfig, FaultSet, Telemetry};
use std::fmt;
use std::time::Duration;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// 流停滞、EOF 或套接字错误；需要调用方显式重连
    Lost = 3,
}

impl ConnectionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Lost,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Lost => "Lost",
        };
        f.write_str(text)
    }
}

/// 单帧遥测及其接收统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub telemetry: Telemetry,
    /// 控制器帧计数
    pub counter: u32,
    /// 控制器 TAI 时间戳（s）
    pub tai: f64,
    /// 与上一帧的接收间隔（单调时钟），首帧为 `None`
    pub interval: Option<Duration>,
    /// 与上一帧的 TAI 时间差（s），首帧为 `None`
    pub tai_interval: Option<f64>,
    /// 接收间隔超过 stale 阈值
    pub stale: bool,
    /// 本帧推导出的故障集合
    pub faults: FaultSet,
    pub rate: RateSnapshot,
}

/// IO 线程发布的事件
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    ConnectionStateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Telemetry(TelemetrySample),
    Configuration(ControllerConfig),
    Acknowledgment(Acknowledgment),
    /// 连续损坏帧超过阈值（`degraded = true`）或恢复（`degraded = false`）
    DataIntegrityDegraded { degraded: bool, consecutive: u32 },
}
