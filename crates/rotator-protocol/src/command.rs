//! 命令定义（客户端 → 控制器）
//!
//! 线上命令统一为 `commander + code + param1..param6`，参数含义取决于命令码。
//! [`Command`] 是类型化的表示，[`WireCommand`] 是线上表示，两者互相转换。

use crate::ProtocolError;
use crate::state::CommandSource;
use bytes::{Buf, BufMut};
use num_enum::TryFromPrimitive;
use std::fmt;

/// 命令负载长度：commander(1) + code(2) + 6 × f64
pub const COMMAND_PAYLOAD_LEN: usize = 1 + 2 + 6 * 8;

/// 命令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum CommandCode {
    EnableDrives = 0x7000,
    SetState = 0x8000,
    SetEnabledSubstate = 0x8001,
    PositionSet = 0x8004,
    SetConstantVel = 0x800B,
    MaskLimitSw = 0x800C,
    DisableUpperPosLimit = 0x800D,
    DisableLowerPosLimit = 0x800E,
    CmdSource = 0x800F,
    ConfigVel = 0x9001,
    ConfigAccel = 0x9002,
    ConfigJerk = 0x9003,
    ConfigAccelEmergency = 0x9004,
    ConfigJerkEmergency = 0x9005,
}

// SET_STATE 的参数（与触发器枚举值不同）
const SET_STATE_ENABLE: f64 = 2.0;
const SET_STATE_STANDBY: f64 = 3.0;
const SET_STATE_CLEAR_ERROR: f64 = 6.0;

// SET_ENABLED_SUBSTATE 的参数
const SUBSTATE_MOVE: f64 = 1.0;
const SUBSTATE_STOP: f64 = 3.0;
const SUBSTATE_CONST_VEL: f64 = 6.0;

/// 类型化命令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// 使能 / 禁用驱动器
    EnableDrives { enable: bool },
    /// 状态命令：Standby → Enabled
    Enable,
    /// 状态命令：Enabled → Standby
    StandBy,
    /// 状态命令：Fault/WaitClearError → Standby
    ClearError,
    /// 子状态命令：点到点运动到 `PositionSet` 设定的位置
    Move,
    /// 子状态命令：停止
    Stop,
    /// 子状态命令：以 `SetConstantVel` 设定的速度恒速运动
    ConstVel,
    /// 设定目标位置（deg）
    PositionSet { position: f64 },
    /// 设定恒速运动参数
    SetConstantVel { velocity: f64, duration: f64 },
    /// 临时屏蔽限位开关
    MaskLimitSwitch,
    DisableUpperPosLimit,
    DisableLowerPosLimit,
    /// 切换命令源
    SwitchCommandSource { to: CommandSource },
    ConfigVelocity { limit: f64 },
    ConfigAcceleration { limit: f64 },
    ConfigJerk { limit: f64 },
    ConfigAccelerationEmergency { limit: f64 },
    ConfigJerkEmergency { limit: f64 },
}

impl Command {
    /// 命令名称（用于日志与错误信息）
    pub fn name(&self) -> &'static str {
        match self {
            Command::EnableDrives { .. } => "EnableDrives",
            Command::Enable => "Enable",
            Command::StandBy => "StandBy",
            Command::ClearError => "ClearError",
            Command::Move => "Move",
            Command::Stop => "Stop",
            Command::ConstVel => "ConstVel",
            Command::PositionSet { .. } => "PositionSet",
            Command::SetConstantVel { .. } => "SetConstantVel",
            Command::MaskLimitSwitch => "MaskLimitSwitch",
            Command::DisableUpperPosLimit => "DisableUpperPosLimit",
            Command::DisableLowerPosLimit => "DisableLowerPosLimit",
            Command::SwitchCommandSource { .. } => "SwitchCommandSource",
            Command::ConfigVelocity { .. } => "ConfigVelocity",
            Command::ConfigAcceleration { .. } => "ConfigAcceleration",
            Command::ConfigJerk { .. } => "ConfigJerk",
            Command::ConfigAccelerationEmergency { .. } => "ConfigAccelerationEmergency",
            Command::ConfigJerkEmergency { .. } => "ConfigJerkEmergency",
        }
    }

    pub fn code(&self) -> CommandCode {
        match self {
            Command::EnableDrives { .. } => CommandCode::EnableDrives,
            Command::Enable | Command::StandBy | Command::ClearError => CommandCode::SetState,
            Command::Move | Command::Stop | Command::ConstVel => CommandCode::SetEnabledSubstate,
            Command::PositionSet { .. } => CommandCode::PositionSet,
            Command::SetConstantVel { .. } => CommandCode::SetConstantVel,
            Command::MaskLimitSwitch => CommandCode::MaskLimitSw,
            Command::DisableUpperPosLimit => CommandCode::DisableUpperPosLimit,
            Command::DisableLowerPosLimit => CommandCode::DisableLowerPosLimit,
            Command::SwitchCommandSource { .. } => CommandCode::CmdSource,
            Command::ConfigVelocity { .. } => CommandCode::ConfigVel,
            Command::ConfigAcceleration { .. } => CommandCode::ConfigAccel,
            Command::ConfigJerk { .. } => CommandCode::ConfigJerk,
            Command::ConfigAccelerationEmergency { .. } => CommandCode::ConfigAccelEmergency,
            Command::ConfigJerkEmergency { .. } => CommandCode::ConfigJerkEmergency,
        }
    }

    /// 转换为线上表示（命令方固定为 GUI）
    pub fn to_wire(&self) -> WireCommand {
        let mut params = [0.0; 6];
        match *self {
            Command::EnableDrives { enable } => params[0] = if enable { 1.0 } else { 0.0 },
            Command::Enable => params[0] = SET_STATE_ENABLE,
            Command::StandBy => params[0] = SET_STATE_STANDBY,
            Command::ClearError => params[0] = SET_STATE_CLEAR_ERROR,
            Command::Move => params[0] = SUBSTATE_MOVE,
            Command::Stop => params[0] = SUBSTATE_STOP,
            Command::ConstVel => params[0] = SUBSTATE_CONST_VEL,
            Command::PositionSet { position } => params[0] = position,
            Command::SetConstantVel { velocity, duration } => {
                params[0] = velocity;
                params[1] = duration;
            },
            Command::MaskLimitSwitch | Command::DisableUpperPosLimit | Command::DisableLowerPosLimit => {},
            Command::SwitchCommandSource { to } => {
                params[0] = if to == CommandSource::Csc { 1.0 } else { 0.0 }
            },
            Command::ConfigVelocity { limit }
            | Command::ConfigAcceleration { limit }
            | Command::ConfigJerk { limit }
            | Command::ConfigAccelerationEmergency { limit }
            | Command::ConfigJerkEmergency { limit } => params[0] = limit,
        }

        WireCommand {
            commander: CommandSource::Gui,
            code: self.code(),
            params,
        }
    }

    /// 从线上表示还原
    pub fn from_wire(wire: &WireCommand) -> Result<Self, ProtocolError> {
        let p1 = wire.params[0];
        let command = match wire.code {
            CommandCode::EnableDrives => match p1 {
                1.0 => Command::EnableDrives { enable: true },
                0.0 => Command::EnableDrives { enable: false },
                _ => return Err(invalid_param(p1)),
            },
            CommandCode::SetState => match p1 {
                SET_STATE_ENABLE => Command::Enable,
                SET_STATE_STANDBY => Command::StandBy,
                SET_STATE_CLEAR_ERROR => Command::ClearError,
                _ => return Err(invalid_param(p1)),
            },
            CommandCode::SetEnabledSubstate => match p1 {
                SUBSTATE_MOVE => Command::Move,
                SUBSTATE_STOP => Command::Stop,
                SUBSTATE_CONST_VEL => Command::ConstVel,
                _ => return Err(invalid_param(p1)),
            },
            CommandCode::PositionSet => Command::PositionSet { position: p1 },
            CommandCode::SetConstantVel => Command::SetConstantVel {
                velocity: p1,
                duration: wire.params[1],
            },
            CommandCode::MaskLimitSw => Command::MaskLimitSwitch,
            CommandCode::DisableUpperPosLimit => Command::DisableUpperPosLimit,
            CommandCode::DisableLowerPosLimit => Command::DisableLowerPosLimit,
            CommandCode::CmdSource => match p1 {
                1.0 => Command::SwitchCommandSource {
                    to: CommandSource::Csc,
                },
                0.0 => Command::SwitchCommandSource {
                    to: CommandSource::Gui,
                },
                _ => return Err(invalid_param(p1)),
            },
            CommandCode::ConfigVel => Command::ConfigVelocity { limit: p1 },
            CommandCode::ConfigAccel => Command::ConfigAcceleration { limit: p1 },
            CommandCode::ConfigJerk => Command::ConfigJerk { limit: p1 },
            CommandCode::ConfigAccelEmergency => Command::ConfigAccelerationEmergency { limit: p1 },
            CommandCode::ConfigJerkEmergency => Command::ConfigJerkEmergency { limit: p1 },
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wire = self.to_wire();
        write!(f, "{} (0x{:04X})", self.name(), wire.code as u16)
    }
}

fn invalid_param(value: f64) -> ProtocolError {
    ProtocolError::InvalidValue {
        field: "param1",
        value,
    }
}

/// 线上命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireCommand {
    pub commander: CommandSource,
    pub code: CommandCode,
    pub params: [f64; 6],
}

impl WireCommand {
    pub fn encode_payload(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.commander as u8);
        buf.put_u16_le(self.code as u16);
        for param in self.params {
            buf.put_f64_le(param);
        }
    }

    pub fn decode_payload(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != COMMAND_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: COMMAND_PAYLOAD_LEN,
                actual: buf.len(),
            });
        }

        let raw_commander = buf.get_u8();
        let commander =
            CommandSource::try_from(raw_commander).map_err(|_| ProtocolError::InvalidValue {
                field: "commander",
                value: raw_commander as f64,
            })?;
        let raw_code = buf.get_u16_le();
        let code = CommandCode::try_from(raw_code)
            .map_err(|_| ProtocolError::UnknownCommandCode { code: raw_code })?;
        let mut params = [0.0; 6];
        for param in params.iter_mut() {
            *param = buf.get_f64_le();
        }

        Ok(Self {
            commander,
            code,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_command_params() {
        for (command, value) in [
            (Command::Enable, 2.0),
            (Command::StandBy, 3.0),
            (Command::ClearError, 6.0),
        ] {
            let wire = command.to_wire();
            assert_eq!(wire.commander, CommandSource::Gui);
            assert_eq!(wire.code, CommandCode::SetState);
            assert_eq!(wire.params[0], value);
        }
    }

    #[test]
    fn test_enabled_substate_command_params() {
        for (command, value) in [
            (Command::Move, 1.0),
            (Command::Stop, 3.0),
            (Command::ConstVel, 6.0),
        ] {
            let wire = command.to_wire();
            assert_eq!(wire.code, CommandCode::SetEnabledSubstate);
            assert_eq!(wire.params[0], value);
        }
    }

    #[test]
    fn test_set_constant_vel_uses_two_params() {
        let wire = Command::SetConstantVel {
            velocity: -1.5,
            duration: 10.0,
        }
        .to_wire();
        assert_eq!(wire.code, CommandCode::SetConstantVel);
        assert_eq!(&wire.params[..3], &[-1.5, 10.0, 0.0]);
    }

    #[test]
    fn test_switch_command_source_param() {
        let to_csc = Command::SwitchCommandSource {
            to: CommandSource::Csc,
        };
        assert_eq!(to_csc.to_wire().params[0], 1.0);
        let to_gui = Command::SwitchCommandSource {
            to: CommandSource::Gui,
        };
        assert_eq!(to_gui.to_wire().params[0], 0.0);
    }

    #[test]
    fn test_from_wire_rejects_unknown_param() {
        let mut wire = Command::Enable.to_wire();
        wire.params[0] = 4.0;
        assert!(matches!(
            Command::from_wire(&wire),
            Err(ProtocolError::InvalidValue { field: "param1", .. })
        ));
    }

    #[test]
    fn test_payload_layout() {
        let wire = Command::PositionSet { position: 80.0 }.to_wire();
        let mut buf = Vec::new();
        wire.encode_payload(&mut buf);
        assert_eq!(buf.len(), COMMAND_PAYLOAD_LEN);
        assert_eq!(buf[0], 1);
        assert_eq!(u16::from_le_bytes([buf[1], buf[2]]), 0x8004);
        assert_eq!(f64::from_le_bytes(buf[3..11].try_into().unwrap()), 80.0);
    }

    #[test]
    fn test_payload_rejects_unknown_code() {
        let mut buf = Vec::new();
        Command::Stop.to_wire().encode_payload(&mut buf);
        buf[1] = 0x34;
        buf[2] = 0x12;
        assert_eq!(
            WireCommand::decode_payload(&buf).unwrap_err(),
            ProtocolError::UnknownCommandCode { code: 0x1234 }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::Move.to_string(), "Move (0x8001)");
        assert_eq!(
            Command::ConfigAcceleration { limit: 0.8 }.to_string(),
            "ConfigAcceleration (0x9002)"
        );
    }
}
