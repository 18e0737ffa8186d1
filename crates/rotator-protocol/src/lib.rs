//! # Rotator Protocol
//!
//! 旋转台控制器 TCP 协议定义（无网络依赖）
//!
//! ## 模块
//!
//! - `frame`: 帧头与帧类型
//! - `telemetry`: 遥测帧
//! - `config`: 配置帧
//! - `ack`: 命令应答帧
//! - `command`: 命令编码
//! - `state`: 控制器状态 / 子状态 / 命令源
//! - `status`: 驱动器与应用状态寄存器位域
//! - `fault`: 故障分类
//! - `codec`: 编解码入口与流式重组
//!
//! ## 字节序
//!
//! 所有多字节字段均为小端字节序（little-endian），浮点数为 IEEE-754 双精度。

pub mod ack;
pub mod codec;
pub mod command;
pub mod config;
pub mod fault;
pub mod frame;
pub mod state;
pub mod status;
pub mod telemetry;

// 重新导出常用类型
pub use ack::{Acknowledgment, CommandStatus};
pub use codec::{Decoded, FrameReader, decode, decode_command, encode_command};
pub use command::{Command, CommandCode, WireCommand};
pub use config::ControllerConfig;
pub use fault::{FaultKind, FaultSet};
pub use frame::{FrameHeader, FrameId, PROTOCOL_VERSION};
pub use state::{CommandSource, ControllerState, EnabledSubstate, FaultSubstate};
pub use telemetry::Telemetry;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unknown frame id: 0x{id:02X}")]
    UnknownFrameId { id: u8 },

    #[error("Unsupported protocol version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("Unknown command code: 0x{code:04X}")]
    UnknownCommandCode { code: u16 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },
}

/// 控制器允许的最大加速度（deg/s²）
pub const MAX_ACCELERATION: f64 = 1.0;

/// 控制器允许的最大 jerk（deg/s³）
pub const MAX_JERK: f64 = 1.0;

/// 控制器允许的最大速度（deg/s）
pub const MAX_VELOCITY: f64 = 3.5;

/// 最大旋转角度（deg）
pub const MAX_ROTATION: f64 = 90.0;

/// 驱动轴数量（A/B 两轴）
pub const NUM_AXES: usize = 2;
