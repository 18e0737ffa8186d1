//! # Rotator Driver
//!
//! 旋转台控制器的连接层：
//! - TCP 连接管理（连接超时、幂等断开、不自动重连）
//! - 单 IO 线程：读取、帧重组、解码、命令发送（双重 Drain）
//! - 流停滞检测（`stall_factor × telemetry_period` 无帧即判定丢失）
//! - 遥测解码：帧间隔、stale 标记、滚动帧率、数据完整性下降检测
//! - 钩子系统：把事件交给上层回调
//!
//! 大多数用户应该使用 `rotator-client` 提供的会话接口。

pub mod config;
mod context;
pub mod decoder;
mod error;
pub mod event;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
mod session;
pub mod stats;
pub mod watchdog;

pub use config::{ConnectionConfig, DEFAULT_PORT};
pub use context::SessionContext;
pub use decoder::TelemetryDecoder;
pub use error::SessionError;
pub use event::{ConnectionState, DriverEvent, TelemetrySample};
pub use hooks::{HookManager, SessionCallback};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use pipeline::io_loop;
pub use session::ConnectionManager;
pub use stats::{RateSnapshot, RateStats};
pub use watchdog::StallWatchdog;
