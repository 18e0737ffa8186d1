//! Rotator SDK - 旋转台控制器 Rust SDK
//!
//! 通过 TCP 与旋转台控制器建立会话：接收遥测与配置，发送命令并跟踪其结果。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 帧格式、遥测/配置/应答解码、命令编码
//! - **连接层** (`driver`): TCP 连接、IO 线程、流停滞检测、遥测统计
//! - **会话层** (`client`): 状态跟踪、命令源仲裁、命令调度、事件总线
//! - **模拟器** (`sim`): 本地模拟控制器，用于仿真模式和测试
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use rotator_sdk::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::load_from_file("rotator.toml")?;
//! init_logger(config.log_level()?)?;
//!
//! let session = config.build_session();
//! let events = session.subscribe();
//! session.connect()?;
//! session.wait_for_telemetry(Duration::from_secs(2))?;
//!
//! session.execute(Command::Enable)?;
//! session.execute(Command::PositionSet { position: 12.0 })?;
//! let ticket = session.submit(Command::Move)?;
//! println!("Move: {}", ticket.wait());
//!
//! for event in events.try_iter() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub use rotator_client as client;
pub use rotator_driver as driver;
pub use rotator_protocol as protocol;
pub use rotator_sim as sim;

pub mod config;
pub mod logging;
pub mod prelude;

use thiserror::Error;

// --- 公共 API ---

pub use client::{
    CommandError, CommandOutcome, CommandTicket, FailureReason, Session, SessionBuilder,
    SessionEvent, SessionStatus,
};
pub use config::{ConfigError, SessionConfig};
pub use driver::{ConnectionConfig, ConnectionState, DEFAULT_PORT, SessionError};
pub use logging::{LoggerError, init_logger};
pub use protocol::{Command, CommandSource, ControllerState, ProtocolError};
pub use sim::{MockConfig, MockController};

/// SDK 顶层错误
#[derive(Error, Debug)]
pub enum SdkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logger(#[from] LoggerError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Command(#[from] CommandError),
}
