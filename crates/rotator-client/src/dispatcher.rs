//! 命令调度
//!
//! 同一时间只允许一个未决命令。提交时依次检查：
//! 连接 → 未决命令 → 控制器状态 → 命令权 → 参数范围，
//! 全部通过后才编码并发送。
//!
//! 未决命令由 IO 线程解决：
//! - NoAck：`Failed(Rejected(reason))`
//! - 有遥测效果的命令：观测到相对提交时的变化才成功（Done 也算成功）；
//!   提交时效果已成立的命令（如静止时 Stop）只能由 Ack/Done 决定
//! - 其他命令：Ack / Done 即成功
//! - 超过截止时间：`TimedOut`
//! - 连接丢失或断开：`Failed(ConnectionLost)`

use crate::arbiter::CommandSourceArbiter;
use crate::error::{CommandError, CommandOutcome, FailureReason};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use rotator_driver::{ConnectionState, SessionError};
use rotator_protocol::{
    Acknowledgment, Command, CommandSource, CommandStatus, ControllerConfig, ControllerState, EnabledSubstate,
    FaultSubstate, MAX_ACCELERATION, MAX_JERK, MAX_ROTATION, MAX_VELOCITY, Telemetry, encode_command,
};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 判定点到点运动已完成的位置容差（deg）
const MOVE_DONE_TOLERANCE: f64 = 1e-3;

/// 提交时需要的会话视图
pub struct DispatchView<'a> {
    pub connection: ConnectionState,
    pub state: Option<ControllerState>,
    pub config: Option<&'a ControllerConfig>,
    pub arbiter: &'a CommandSourceArbiter,
}

/// 未决命令的公开信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingInfo {
    pub command: Command,
    pub counter: u32,
    pub submitted_at: Instant,
}

/// 一次命令解决
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub command: Command,
    pub counter: u32,
    pub outcome: CommandOutcome,
}

/// 处理应答帧的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AckHandling {
    /// 控制器接受（Ack/Done）的未决命令
    pub accepted: Option<Command>,
    pub resolution: Option<Resolution>,
}

struct PendingCommand {
    command: Command,
    counter: u32,
    submitted_at: Instant,
    deadline: Instant,
    acked: bool,
    /// 提交时效果已成立，遥测无法区分，只接受 Ack/Done
    effect_held: bool,
    /// Move 的目标位置（最近一次被接受的 PositionSet）
    move_target: Option<f64>,
    resolver: Sender<CommandOutcome>,
}

pub struct CommandDispatcher {
    pending: Mutex<Option<PendingCommand>>,
    /// 最近一次被控制器接受的 PositionSet
    position_set: Mutex<Option<f64>>,
    next_counter: AtomicU32,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            position_set: Mutex::new(None),
            next_counter: AtomicU32::new(1),
            timeout,
        }
    }

    /// 提交命令
    ///
    /// 校验通过后用 `send` 把编码后的帧交给连接层。
    /// 槽位在发送期间保持加锁，保证并发提交中只有一个被发送。
    pub fn submit<F>(&self, command: Command, view: &DispatchView<'_>, send: F) -> Result<CommandTicket, CommandError>
    where
        F: FnOnce(Bytes) -> Result<(), SessionError>,
    {
        let mut slot = self.pending.lock();

        if view.connection != ConnectionState::Connected {
            return Err(CommandError::NotConnected);
        }
        if let Some(pending) = slot.as_ref() {
            return Err(CommandError::Busy {
                pending: pending.command.name(),
            });
        }
        if !is_admissible(&command, view.state) {
            return Err(CommandError::InvalidForState {
                command: command.name(),
                state: view.state.map_or_else(|| "Unknown".to_string(), |s| s.to_string()),
            });
        }
        view.arbiter.authorize(&command)?;
        validate_parameters(&command, view.config)?;

        let counter = self.next_counter.fetch_add(1, Ordering::Relaxed);
        send(encode_command(&command, counter)).map_err(|e| match e {
            SessionError::ChannelFull => CommandError::Busy {
                pending: command.name(),
            },
            _ => CommandError::NotConnected,
        })?;

        info!("New command: {} (counter {})", command, counter);

        // 状态未知时无法判断效果是否已成立
        let effect_held = has_telemetry_effect(&command)
            && view.state.is_none_or(|state| effect_holds(&command, state, view.arbiter.current()));
        let move_target = match command {
            Command::Move => *self.position_set.lock(),
            _ => None,
        };

        let now = Instant::now();
        let (tx, rx) = crossbeam_channel::bounded(1);
        *slot = Some(PendingCommand {
            command,
            counter,
            submitted_at: now,
            deadline: now + self.timeout,
            acked: false,
            effect_held,
            move_target,
            resolver: tx,
        });

        Ok(CommandTicket {
            command,
            counter,
            rx,
            outcome: OnceLock::new(),
        })
    }

    /// 处理应答帧
    pub fn on_ack(&self, ack: &Acknowledgment) -> AckHandling {
        let mut slot = self.pending.lock();
        let Some(pending) = slot.as_mut() else {
            debug!("Acknowledgment for counter {} with no pending command", ack.counter);
            return AckHandling::default();
        };
        if pending.counter != ack.counter {
            debug!(
                "Acknowledgment counter {} does not match pending counter {}",
                ack.counter, pending.counter
            );
            return AckHandling::default();
        }

        let command = pending.command;
        if ack.status != CommandStatus::NoAck {
            if let Command::PositionSet { position } = command {
                *self.position_set.lock() = Some(position);
            }
        }
        match ack.status {
            CommandStatus::NoAck => {
                warn!("Command {} rejected: {}", command, ack.reason);
                AckHandling {
                    accepted: None,
                    resolution: resolve(&mut slot, CommandOutcome::Failed(FailureReason::Rejected(ack.reason.clone()))),
                }
            },
            CommandStatus::Ack if has_telemetry_effect(&command) && !pending.effect_held => {
                pending.acked = true;
                AckHandling {
                    accepted: Some(command),
                    resolution: None,
                }
            },
            CommandStatus::Ack | CommandStatus::Done => AckHandling {
                accepted: Some(command),
                resolution: resolve(&mut slot, CommandOutcome::Succeeded),
            },
        }
    }

    /// 检查遥测是否体现了未决命令的效果
    pub fn on_telemetry(&self, telemetry: &Telemetry) -> Option<Resolution> {
        let mut slot = self.pending.lock();
        let pending = slot.as_ref()?;
        if !has_telemetry_effect(&pending.command) || pending.effect_held || !effect_observed(pending, telemetry) {
            return None;
        }
        resolve(&mut slot, CommandOutcome::Succeeded)
    }

    /// 截止时间检查（单调时钟）
    pub fn on_tick(&self, now: Instant) -> Option<Resolution> {
        let mut slot = self.pending.lock();
        if slot.as_ref()?.deadline > now {
            return None;
        }
        if let Some(pending) = slot.as_ref() {
            warn!("Command {} timed out after {:?}", pending.command, self.timeout);
        }
        resolve(&mut slot, CommandOutcome::TimedOut)
    }

    /// 连接丢失或断开时使未决命令失败
    pub fn fail_pending(&self) -> Option<Resolution> {
        let mut slot = self.pending.lock();
        *self.position_set.lock() = None;
        resolve(&mut slot, CommandOutcome::Failed(FailureReason::ConnectionLost))
    }

    pub fn pending(&self) -> Option<PendingInfo> {
        self.pending.lock().as_ref().map(|p| PendingInfo {
            command: p.command,
            counter: p.counter,
            submitted_at: p.submitted_at,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn resolve(slot: &mut Option<PendingCommand>, outcome: CommandOutcome) -> Option<Resolution> {
    let pending = slot.take()?;
    info!(
        "Command {} (counter {}) resolved after {:?}: {}",
        pending.command,
        pending.counter,
        pending.submitted_at.elapsed(),
        outcome
    );
    // 票据可能已被丢弃
    let _ = pending.resolver.try_send(outcome.clone());
    Some(Resolution {
        command: pending.command,
        counter: pending.counter,
        outcome,
    })
}

/// 命令在给定控制器状态下是否可接受（状态未知时只接受与状态无关的命令）
pub fn is_admissible(command: &Command, state: Option<ControllerState>) -> bool {
    use ControllerState::{Enabled, Fault, Standby};

    match command {
        Command::MaskLimitSwitch
        | Command::DisableUpperPosLimit
        | Command::DisableLowerPosLimit
        | Command::SwitchCommandSource { .. } => true,
        _ => {
            let Some(state) = state else {
                return false;
            };
            match command {
                Command::Enable => state == Standby,
                Command::StandBy | Command::Stop => state.is_enabled(),
                Command::ClearError => state == Fault(FaultSubstate::WaitClearError),
                Command::Move | Command::ConstVel | Command::PositionSet { .. } | Command::SetConstantVel { .. } => {
                    state == Enabled(EnabledSubstate::Stationary)
                },
                Command::ConfigVelocity { .. }
                | Command::ConfigAcceleration { .. }
                | Command::ConfigJerk { .. }
                | Command::ConfigAccelerationEmergency { .. }
                | Command::ConfigJerkEmergency { .. } => {
                    state == Standby || state == Enabled(EnabledSubstate::Stationary)
                },
                Command::EnableDrives { .. } => state == Standby || state.is_enabled(),
                Command::MaskLimitSwitch
                | Command::DisableUpperPosLimit
                | Command::DisableLowerPosLimit
                | Command::SwitchCommandSource { .. } => true,
            }
        },
    }
}

/// 参数范围检查
///
/// 尚未收到配置帧时使用控制器的固定上限。
pub fn validate_parameters(command: &Command, config: Option<&ControllerConfig>) -> Result<(), CommandError> {
    let (lower, upper) = config.map_or((-MAX_ROTATION, MAX_ROTATION), |c| (c.lower_pos_limit, c.upper_pos_limit));
    let max_velocity = config.map_or(MAX_VELOCITY, |c| c.max_velocity_limit);

    match *command {
        Command::PositionSet { position } => {
            finite("position", position)?;
            if !(lower..=upper).contains(&position) {
                return Err(invalid("position", format!("{} not in [{}, {}]", position, lower, upper)));
            }
        },
        Command::SetConstantVel { velocity, duration } => {
            finite("velocity", velocity)?;
            finite("duration", duration)?;
            if velocity == 0.0 || velocity.abs() > max_velocity {
                return Err(invalid(
                    "velocity",
                    format!("{} must be non-zero with magnitude at most {}", velocity, max_velocity),
                ));
            }
            if duration <= 0.0 {
                return Err(invalid("duration", format!("{} must be positive", duration)));
            }
        },
        Command::ConfigVelocity { limit } => in_range("velocity", limit, max_velocity)?,
        Command::ConfigAcceleration { limit } => in_range("acceleration", limit, MAX_ACCELERATION)?,
        Command::ConfigAccelerationEmergency { limit } => in_range("emergency acceleration", limit, MAX_ACCELERATION)?,
        Command::ConfigJerk { limit } => in_range("jerk", limit, MAX_JERK)?,
        Command::ConfigJerkEmergency { limit } => in_range("emergency jerk", limit, MAX_JERK)?,
        _ => {},
    }
    Ok(())
}

fn invalid(param: &'static str, reason: String) -> CommandError {
    CommandError::InvalidParameter { param, reason }
}

fn finite(param: &'static str, value: f64) -> Result<(), CommandError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(param, format!("{} is not finite", value)))
    }
}

fn in_range(param: &'static str, value: f64, max: f64) -> Result<(), CommandError> {
    finite(param, value)?;
    if value > 0.0 && value <= max {
        Ok(())
    } else {
        Err(invalid(param, format!("{} not in range (0, {}]", value, max)))
    }
}

/// 命令是否以遥测变化作为成功依据
pub fn has_telemetry_effect(command: &Command) -> bool {
    matches!(
        command,
        Command::Enable
            | Command::StandBy
            | Command::ClearError
            | Command::Move
            | Command::ConstVel
            | Command::Stop
            | Command::SwitchCommandSource { .. }
    )
}

/// 给定状态与命令源下命令的效果是否成立
fn effect_holds(command: &Command, state: ControllerState, source: CommandSource) -> bool {
    match command {
        Command::Enable => state.is_enabled(),
        Command::StandBy | Command::ClearError => state == ControllerState::Standby,
        Command::Move => state == ControllerState::Enabled(EnabledSubstate::MovingPt2Pt),
        Command::ConstVel => state == ControllerState::Enabled(EnabledSubstate::ConstVel),
        Command::Stop => {
            state == ControllerState::Enabled(EnabledSubstate::ControlledStopping) || state.is_stationary()
        },
        Command::SwitchCommandSource { to } => source == *to,
        _ => false,
    }
}

fn effect_observed(pending: &PendingCommand, telemetry: &Telemetry) -> bool {
    if effect_holds(&pending.command, telemetry.state, telemetry.command_source()) {
        return true;
    }
    if pending.command != Command::Move || !pending.acked || !telemetry.state.is_stationary() {
        return false;
    }
    // 一个周期内完成的短距离运动：Ack 之后静止在目标位置
    let target = pending.move_target.unwrap_or(telemetry.set_pos);
    (telemetry.current_pos - target).abs() <= MOVE_DONE_TOLERANCE
        && (telemetry.demand_pos - target).abs() <= MOVE_DONE_TOLERANCE
}

/// 已发送命令的结果句柄
pub struct CommandTicket {
    command: Command,
    counter: u32,
    rx: Receiver<CommandOutcome>,
    outcome: OnceLock<CommandOutcome>,
}

impl CommandTicket {
    pub fn command(&self) -> Command {
        self.command
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// 阻塞直到命令有结果
    pub fn wait(&self) -> CommandOutcome {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }
        let outcome = self
            .rx
            .recv()
            .unwrap_or(CommandOutcome::Failed(FailureReason::ConnectionLost));
        self.outcome.get_or_init(|| outcome).clone()
    }

    /// 最多等待 `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CommandOutcome> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome.clone());
        }
        let outcome = match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => CommandOutcome::Failed(FailureReason::ConnectionLost),
        };
        Some(self.outcome.get_or_init(|| outcome).clone())
    }

    /// 非阻塞查询
    pub fn try_outcome(&self) -> Option<CommandOutcome> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome.clone());
        }
        let outcome = match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => CommandOutcome::Failed(FailureReason::ConnectionLost),
        };
        Some(self.outcome.get_or_init(|| outcome).clone())
    }
}

impl std::fmt::Debug for CommandTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTicket")
            .field("command", &self.command)
            .field("counter", &self.counter)
            .field("outcome", &self.outcome.get())
            .finish()
    }
}
