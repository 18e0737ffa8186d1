//! 会话状态快照
//!
//! IO 线程整体替换快照（`ArcSwap`），调用方读到的总是一致的一帧视图。

use crate::dispatcher::PendingInfo;
use rotator_driver::{ConnectionState, MetricsSnapshot, RateSnapshot, TelemetrySample};
use rotator_protocol::status::{ApplicationStatus, SimulinkFlags, StatusWord};
use rotator_protocol::{CommandSource, ControllerConfig, ControllerState, FaultSet, NUM_AXES};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub connection: ConnectionState,
    /// 最近一帧遥测
    pub telemetry: Option<TelemetrySample>,
    /// 最近一次配置帧
    pub config: Option<ControllerConfig>,
    /// 首帧遥测之前为 `None`
    pub controller_state: Option<ControllerState>,
    pub active_faults: FaultSet,
    pub command_source: CommandSource,
    pub pending: Option<PendingInfo>,
    pub data_integrity_degraded: bool,
    /// 读取快照时填充
    pub metrics: MetricsSnapshot,
}

impl SessionStatus {
    pub fn rate(&self) -> Option<RateSnapshot> {
        self.telemetry.map(|sample| sample.rate)
    }

    pub fn application_status(&self) -> Option<ApplicationStatus> {
        self.telemetry.map(|sample| sample.telemetry.application())
    }

    pub fn simulink_flags(&self) -> Option<SimulinkFlags> {
        self.telemetry.map(|sample| sample.telemetry.simulink())
    }

    pub fn status_words(&self) -> Option<[StatusWord; NUM_AXES]> {
        self.telemetry.map(|sample| sample.telemetry.status_words())
    }

    pub fn position(&self) -> Option<f64> {
        self.telemetry.map(|sample| sample.telemetry.current_pos)
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}
