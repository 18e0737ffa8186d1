//! 遥测解码器
//!
//! 把 [`Decoded`] 帧转换为 [`DriverEvent`]：
//! - 遥测帧：计算接收间隔与 TAI 时间差，超过 stale 阈值时标记样本
//! - 配置帧：整体替换保存的配置快照
//! - 损坏帧：统计连续次数，超过阈值时上报一次 `DataIntegrityDegraded`，
//!   下一帧正常帧到达时清除

use crate::config::ConnectionConfig;
use crate::event::{DriverEvent, TelemetrySample};
use crate::stats::RateStats;
use rotator_protocol::{ControllerConfig, Decoded, ProtocolError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 日志中最多输出的原始字节数
const MAX_LOGGED_BYTES: usize = 64;

pub struct TelemetryDecoder {
    stale_threshold: Duration,
    malformed_threshold: u32,
    last_received: Option<Instant>,
    last_tai: Option<f64>,
    stats: RateStats,
    consecutive_malformed: u32,
    degraded: bool,
    config: Option<ControllerConfig>,
}

impl TelemetryDecoder {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            stale_threshold: config.stale_threshold(),
            malformed_threshold: config.malformed_threshold,
            last_received: None,
            last_tai: None,
            stats: RateStats::new(),
            consecutive_malformed: 0,
            degraded: false,
            config: None,
        }
    }

    /// 处理一帧，返回需要发布的事件
    pub fn process(&mut self, decoded: Decoded, received_at: Instant) -> Vec<DriverEvent> {
        let mut events = Vec::with_capacity(2);

        match decoded {
            Decoded::Malformed { raw, reason } => {
                self.on_malformed(&raw, &reason, &mut events);
            },
            Decoded::Command { header, .. } => {
                let reason = ProtocolError::ParseError(format!(
                    "controller sent a command frame (counter {})",
                    header.counter
                ));
                self.on_malformed(&[], &reason, &mut events);
            },
            Decoded::Telemetry { header, telemetry } => {
                self.on_clean_frame(&mut events);

                let interval = self.last_received.map(|last| received_at.saturating_duration_since(last));
                let tai = header.tai();
                let tai_interval = self.last_tai.map(|last| tai - last);
                self.last_received = Some(received_at);
                self.last_tai = Some(tai);

                let stale = interval.is_some_and(|i| i > self.stale_threshold);
                if let Some(interval) = interval {
                    self.stats.push(interval);
                    if stale {
                        debug!("Stale telemetry sample: {:?} since previous frame", interval);
                    }
                }

                events.push(DriverEvent::Telemetry(TelemetrySample {
                    telemetry,
                    counter: header.counter,
                    tai,
                    interval,
                    tai_interval,
                    stale,
                    faults: telemetry.faults(),
                    rate: self.stats.snapshot(),
                }));
            },
            Decoded::Configuration { config, .. } => {
                self.on_clean_frame(&mut events);
                self.config = Some(config);
                events.push(DriverEvent::Configuration(config));
            },
            Decoded::Acknowledgment { ack, .. } => {
                self.on_clean_frame(&mut events);
                events.push(DriverEvent::Acknowledgment(ack));
            },
        }

        events
    }

    fn on_clean_frame(&mut self, events: &mut Vec<DriverEvent>) {
        if self.degraded {
            debug!(
                "Clean frame after {} malformed frames, data integrity restored",
                self.consecutive_malformed
            );
            self.degraded = false;
            events.push(DriverEvent::DataIntegrityDegraded {
                degraded: false,
                consecutive: 0,
            });
        }
        self.consecutive_malformed = 0;
    }

    fn on_malformed(&mut self, raw: &[u8], reason: &ProtocolError, events: &mut Vec<DriverEvent>) {
        self.consecutive_malformed = self.consecutive_malformed.saturating_add(1);
        warn!(
            "Malformed frame ({}), {} consecutive: {}",
            reason,
            self.consecutive_malformed,
            hex::encode(&raw[..raw.len().min(MAX_LOGGED_BYTES)])
        );

        if !self.degraded && self.consecutive_malformed > self.malformed_threshold {
            self.degraded = true;
            warn!(
                "Data integrity degraded: {} consecutive malformed frames",
                self.consecutive_malformed
            );
            events.push(DriverEvent::DataIntegrityDegraded {
                degraded: true,
                consecutive: self.consecutive_malformed,
            });
        }
    }

    /// 最近一次收到的配置快照
    pub fn config(&self) -> Option<&ControllerConfig> {
        self.config.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}
