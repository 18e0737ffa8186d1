//! 命令源仲裁
//!
//! 命令权由遥测应用状态字的 `0x400` 位决定。CSC 持有命令权时，
//! 本地只允许发送 `SwitchCommandSource`。

use crate::error::CommandError;
use rotator_driver::ConnectionState;
use rotator_protocol::{Command, CommandSource, Telemetry};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug)]
pub struct CommandSourceArbiter {
    source: AtomicU8,
}

impl Default for CommandSourceArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSourceArbiter {
    pub fn new() -> Self {
        Self {
            source: AtomicU8::new(CommandSource::Gui as u8),
        }
    }

    pub fn current(&self) -> CommandSource {
        CommandSource::try_from(self.source.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// 根据遥测更新命令源，发生变化时返回 `(from, to)`
    pub fn observe(&self, telemetry: &Telemetry) -> Option<(CommandSource, CommandSource)> {
        let to = telemetry.command_source();
        let from = CommandSource::try_from(self.source.swap(to as u8, Ordering::AcqRel)).unwrap_or_default();
        (from != to).then_some((from, to))
    }

    /// 检查本地是否有权发送 `command`
    pub fn authorize(&self, command: &Command) -> Result<(), CommandError> {
        if matches!(command, Command::SwitchCommandSource { .. }) {
            return Ok(());
        }
        match self.current() {
            CommandSource::Gui => Ok(()),
            CommandSource::Csc => Err(CommandError::NotAuthorized {
                command: command.name(),
            }),
        }
    }

    /// 断开前是否需要提醒：仍连接且命令权在本地
    pub fn should_warn_before_disconnect(&self, connection: ConnectionState) -> bool {
        connection == ConnectionState::Connected && self.current() == CommandSource::Gui
    }

    /// 连接重置时恢复默认
    pub fn reset(&self) {
        self.source.store(CommandSource::Gui as u8, Ordering::Release);
    }
}
