//! # Rotator Client
//!
//! 旋转台控制器会话层：
//! - 控制器状态跟踪（转换表校验、Fault 期间保留故障集合）
//! - 命令源仲裁（CSC 持有命令权时只允许切换命令源）
//! - 命令调度（单未决命令、准入校验、Ack/遥测/超时/断线解决）
//! - 事件总线与状态快照
//!
//! ```rust,no_run
//! use rotator_client::SessionBuilder;
//! use rotator_protocol::Command;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionBuilder::new().host("127.0.0.1").build();
//! session.connect()?;
//! session.wait_for_telemetry(Duration::from_secs(2))?;
//!
//! let outcome = session.execute(Command::Enable)?;
//! println!("Enable: {}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod arbiter;
pub mod builder;
mod client;
pub mod dispatcher;
mod error;
pub mod events;
pub mod state;
pub mod status;

pub use arbiter::CommandSourceArbiter;
pub use builder::SessionBuilder;
pub use client::Session;
pub use dispatcher::{CommandDispatcher, CommandTicket, PendingInfo};
pub use error::{CommandError, CommandOutcome, FailureReason};
pub use events::{EventBus, SessionEvent};
pub use state::{ControllerStateTracker, UnexpectedTransition};
pub use status::SessionStatus;
