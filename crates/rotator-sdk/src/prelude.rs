//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use rotator_sdk::prelude::*;
//! ```

// 会话层（推荐使用）
pub use crate::client::{
    CommandError, CommandOutcome, CommandTicket, FailureReason, Session, SessionBuilder,
    SessionEvent, SessionStatus,
};

// 协议类型
pub use crate::protocol::{
    Command, CommandSource, ControllerConfig, ControllerState, EnabledSubstate, FaultKind,
    FaultSet, FaultSubstate, Telemetry,
};

// 连接层
pub use crate::driver::{ConnectionConfig, ConnectionState, MetricsSnapshot, TelemetrySample};

// 配置与日志
pub use crate::config::SessionConfig;
pub use crate::logging::init_logger;

// 错误类型
pub use crate::SdkError;
pub use crate::driver::SessionError;
pub use crate::protocol::ProtocolError;
