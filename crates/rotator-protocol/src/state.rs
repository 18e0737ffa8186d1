//! 控制器状态、子状态与命令源
//!
//! 遥测帧以浮点数上报三个状态码：`state`、`enabled_substate`、`fault_substate`。
//! 本模块把三者合并为一个 [`ControllerState`]，子状态只在其父状态下有意义。

use crate::ProtocolError;
use num_enum::TryFromPrimitive;
use std::fmt;

/// 控制器主状态码（遥测 `state` 字段）
pub const STATE_CODE_STANDBY: u8 = 0;
pub const STATE_CODE_ENABLED: u8 = 2;
pub const STATE_CODE_FAULT: u8 = 4;

/// Enabled 子状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EnabledSubstate {
    /// 静止（进入 Enabled 的初始子状态）
    #[default]
    Stationary = 0,
    /// 点到点运动中
    MovingPt2Pt = 1,
    /// 跟踪 / 转动（仅 CSC 可驱动）
    SlewingAndTracking = 2,
    /// 受控停止中
    ControlledStopping = 3,
    /// 恒速运动
    ConstVel = 6,
}

/// Fault 子状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FaultSubstate {
    /// 紧急停止中（进入 Fault 的初始子状态）
    #[default]
    EmergencyStopping = 1,
    /// 等待清除错误
    WaitClearError = 2,
}

/// 控制器状态（主状态 + 子状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControllerState {
    #[default]
    Standby,
    Enabled(EnabledSubstate),
    Fault(FaultSubstate),
}

impl ControllerState {
    /// 从遥测上报的三个状态码构造
    ///
    /// - 主状态码未知 → 错误
    /// - Enabled 子状态码未知 → 错误
    /// - Fault 状态下子状态码为 0（NO_ERROR）时视为初始子状态 `EmergencyStopping`
    pub fn from_codes(state: f64, enabled_substate: f64, fault_substate: f64) -> Result<Self, ProtocolError> {
        let state_code = code_from_f64("state", state)?;
        match state_code {
            STATE_CODE_STANDBY => Ok(ControllerState::Standby),
            STATE_CODE_ENABLED => {
                let code = code_from_f64("enabled_substate", enabled_substate)?;
                EnabledSubstate::try_from(code)
                    .map(ControllerState::Enabled)
                    .map_err(|_| ProtocolError::InvalidValue {
                        field: "enabled_substate",
                        value: enabled_substate,
                    })
            },
            STATE_CODE_FAULT => {
                let code = code_from_f64("fault_substate", fault_substate)?;
                if code == 0 {
                    return Ok(ControllerState::Fault(FaultSubstate::EmergencyStopping));
                }
                FaultSubstate::try_from(code).map(ControllerState::Fault).map_err(|_| {
                    ProtocolError::InvalidValue {
                        field: "fault_substate",
                        value: fault_substate,
                    }
                })
            },
            _ => Err(ProtocolError::InvalidValue {
                field: "state",
                value: state,
            }),
        }
    }

    /// 转换为遥测状态码 `(state, enabled_substate, fault_substate)`
    pub fn codes(&self) -> (f64, f64, f64) {
        match self {
            ControllerState::Standby => (STATE_CODE_STANDBY as f64, 0.0, 0.0),
            ControllerState::Enabled(sub) => (STATE_CODE_ENABLED as f64, *sub as u8 as f64, 0.0),
            ControllerState::Fault(sub) => (STATE_CODE_FAULT as f64, 0.0, *sub as u8 as f64),
        }
    }

    pub fn is_standby(&self) -> bool {
        matches!(self, ControllerState::Standby)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ControllerState::Enabled(_))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, ControllerState::Fault(_))
    }

    /// 是否处于 Enabled/Stationary
    pub fn is_stationary(&self) -> bool {
        matches!(self, ControllerState::Enabled(EnabledSubstate::Stationary))
    }

    /// 主状态是否相同（忽略子状态）
    pub fn same_parent(&self, other: &ControllerState) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Standby => write!(f, "Standby"),
            ControllerState::Enabled(sub) => write!(f, "Enabled/{:?}", sub),
            ControllerState::Fault(sub) => write!(f, "Fault/{:?}", sub),
        }
    }
}

fn code_from_f64(field: &'static str, value: f64) -> Result<u8, ProtocolError> {
    if !value.is_finite() || value.fract() != 0.0 || !(0.0..=255.0).contains(&value) {
        return Err(ProtocolError::InvalidValue { field, value });
    }
    Ok(value as u8)
}

/// 命令源（谁持有命令权）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CommandSource {
    /// 本地操作员界面
    #[default]
    Gui = 1,
    /// 远程自动化（CSC）
    Csc = 2,
}

impl CommandSource {
    /// 应用状态字中 "命令由 CSC 发出" 的位
    pub const CSC_BIT: u32 = 0x400;

    /// 从应用状态字推导
    pub fn from_application_status(status: u32) -> Self {
        if status & Self::CSC_BIT != 0 {
            CommandSource::Csc
        } else {
            CommandSource::Gui
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSource::Gui => f.write_str("GUI"),
            CommandSource::Csc => f.write_str("CSC"),
        }
    }
}
