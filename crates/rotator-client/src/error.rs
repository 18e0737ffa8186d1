//! 命令错误类型

use thiserror::Error;

/// 命令提交被拒绝的原因（同步返回，命令未发送）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// 当前没有可用的连接
    #[error("Not connected to the controller")]
    NotConnected,

    /// 已有命令在等待结果
    #[error("Command {pending} is still pending")]
    Busy { pending: &'static str },

    /// 控制器当前状态不接受该命令
    #[error("Command {command} is not allowed in state {state}")]
    InvalidForState { command: &'static str, state: String },

    /// 命令权不在本地
    #[error("Command {command} is not allowed while the CSC is the commander")]
    NotAuthorized { command: &'static str },

    /// 参数超出范围
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: &'static str, reason: String },
}

/// 命令已发送但最终失败的原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// 控制器回复 NoAck
    #[error("Rejected by the controller: {0}")]
    Rejected(String),

    /// 结果确定之前连接丢失或被断开
    #[error("Connection lost before the command completed")]
    ConnectionLost,
}

/// 命令的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Succeeded,
    Failed(FailureReason),
    TimedOut,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Succeeded)
    }
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Succeeded => f.write_str("Succeeded"),
            CommandOutcome::Failed(reason) => write!(f, "Failed: {}", reason),
            CommandOutcome::TimedOut => f.write_str("Timed out waiting for the controller"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CommandError::InvalidForState {
            command: "Move",
            state: "Standby".to_string(),
        };
        assert_eq!(err.to_string(), "Command Move is not allowed in state Standby");

        let err = CommandError::InvalidParameter {
            param: "velocity",
            reason: "must be in (0, 3.5]".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter 'velocity': must be in (0, 3.5]");
    }

    #[test]
    fn test_outcome_display() {
        let outcome = CommandOutcome::Failed(FailureReason::Rejected("Must set the position first.".into()));
        assert_eq!(
            outcome.to_string(),
            "Failed: Rejected by the controller: Must set the position first."
        );
        assert!(!outcome.is_success());
        assert!(CommandOutcome::Succeeded.is_success());
    }
}
