//! 遥测帧（控制器 → 客户端，约 20 Hz）
//!
//! 负载布局（小端，共 [`TELEMETRY_PAYLOAD_LEN`] 字节）：
//!
//! | 偏移 | 字段                    | 类型      |
//! |------|-------------------------|-----------|
//! | 0    | status_word[2]          | u16 × 2   |
//! | 4    | latching_fault[2]       | u16 × 2   |
//! | 8    | input_pin_states        | u32       |
//! | 12   | motor_torque[2]         | i16 × 2   |
//! | 16   | copley_status[2]        | u32 × 2   |
//! | 24   | application_status      | u32       |
//! | 28   | motor_current[2]        | f64 × 2   |
//! | 44   | bus_voltage             | f64       |
//! | 52   | demand_pos              | f64       |
//! | 60   | demand_vel              | f64       |
//! | 68   | state                   | f64       |
//! | 76   | enabled_substate        | f64       |
//! | 84   | fault_substate          | f64       |
//! | 92   | rate_cmd[2]             | f64 × 2   |
//! | 108  | velocity_feedback[2]    | f64 × 2   |
//! | 124  | current_pos             | f64       |
//! | 132  | odometer                | f64       |
//! | 140  | set_pos                 | f64       |
//! | 148  | simulink flags          | f64 × 11  |

use crate::fault::FaultSet;
use crate::state::{CommandSource, ControllerState};
use crate::status::{ApplicationStatus, SIMULINK_FLAG_COUNT, SimulinkFlags, StatusWord};
use crate::{NUM_AXES, ProtocolError};
use bilge::prelude::*;
use bytes::{Buf, BufMut};

/// 遥测负载长度
pub const TELEMETRY_PAYLOAD_LEN: usize = 148 + SIMULINK_FLAG_COUNT * 8;

/// 电机力矩的线上单位是 N·m / 1e6
const TORQUE_SCALE: f64 = 1e6;

/// 单帧遥测
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    /// 驱动器状态字（A/B 轴）
    pub status_word: [u16; NUM_AXES],
    /// 锁存故障寄存器（A/B 轴）
    pub latching_fault: [u16; NUM_AXES],
    /// 输入引脚状态
    pub input_pin_states: u32,
    /// 电机力矩原始值（N·m / 1e6）
    pub motor_torque: [i16; NUM_AXES],
    /// Copley 状态寄存器（A/B 轴）
    pub copley_status: [u32; NUM_AXES],
    /// 应用状态字
    pub application_status: u32,
    /// 电机电流（A）
    pub motor_current: [f64; NUM_AXES],
    /// 母线电压（V）
    pub bus_voltage: f64,
    /// 指令位置（deg）
    pub demand_pos: f64,
    /// 指令速度（deg/s）
    pub demand_vel: f64,
    /// 控制器上报的状态
    pub state: ControllerState,
    /// 速率指令（deg/s，A/B 通道）
    pub rate_cmd: [f64; NUM_AXES],
    /// 速度反馈（deg/s，A/B 通道）
    pub velocity_feedback: [f64; NUM_AXES],
    /// 当前位置（deg）
    pub current_pos: f64,
    /// 里程计（deg）
    pub odometer: f64,
    /// POSITION_SET 设定的位置（deg）
    pub set_pos: f64,
    /// Simulink 标志字（见 [`SimulinkFlags`]）
    pub simulink_flags: u16,
}

impl Telemetry {
    /// 速度：两个通道反馈的平均值
    pub fn velocity(&self) -> f64 {
        (self.velocity_feedback[0] + self.velocity_feedback[1]) / 2.0
    }

    /// 电机力矩（N·m）
    pub fn torque_nm(&self) -> [f64; NUM_AXES] {
        self.motor_torque.map(|raw| raw as f64 / TORQUE_SCALE)
    }

    pub fn application(&self) -> ApplicationStatus {
        ApplicationStatus::from(u32::new(self.application_status))
    }

    pub fn simulink(&self) -> SimulinkFlags {
        SimulinkFlags::from(u16::new(self.simulink_flags))
    }

    pub fn status_words(&self) -> [StatusWord; NUM_AXES] {
        self.status_word.map(|raw| StatusWord::from(u16::new(raw)))
    }

    /// 当前命令源
    pub fn command_source(&self) -> CommandSource {
        CommandSource::from_application_status(self.application_status)
    }

    /// 当前活动的故障集合
    pub fn faults(&self) -> FaultSet {
        FaultSet::from_telemetry(self)
    }

    pub fn encode_payload(&self, buf: &mut impl BufMut) {
        for word in self.status_word {
            buf.put_u16_le(word);
        }
        for fault in self.latching_fault {
            buf.put_u16_le(fault);
        }
        buf.put_u32_le(self.input_pin_states);
        for torque in self.motor_torque {
            buf.put_i16_le(torque);
        }
        for status in self.copley_status {
            buf.put_u32_le(status);
        }
        buf.put_u32_le(self.application_status);

        for current in self.motor_current {
            buf.put_f64_le(current);
        }
        buf.put_f64_le(self.bus_voltage);
        buf.put_f64_le(self.demand_pos);
        buf.put_f64_le(self.demand_vel);

        let (state, enabled, fault) = self.state.codes();
        buf.put_f64_le(state);
        buf.put_f64_le(enabled);
        buf.put_f64_le(fault);

        for rate in self.rate_cmd {
            buf.put_f64_le(rate);
        }
        for velocity in self.velocity_feedback {
            buf.put_f64_le(velocity);
        }
        buf.put_f64_le(self.current_pos);
        buf.put_f64_le(self.odometer);
        buf.put_f64_le(self.set_pos);

        for bit in 0..SIMULINK_FLAG_COUNT {
            let active = self.simulink_flags & (1 << bit) != 0;
            buf.put_f64_le(if active { 1.0 } else { 0.0 });
        }
    }

    pub fn decode_payload(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != TELEMETRY_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: TELEMETRY_PAYLOAD_LEN,
                actual: buf.len(),
            });
        }

        let status_word = [buf.get_u16_le(), buf.get_u16_le()];
        let latching_fault = [buf.get_u16_le(), buf.get_u16_le()];
        let input_pin_states = buf.get_u32_le();
        let motor_torque = [buf.get_i16_le(), buf.get_i16_le()];
        let copley_status = [buf.get_u32_le(), buf.get_u32_le()];
        let application_status = buf.get_u32_le();

        let motor_current = [buf.get_f64_le(), buf.get_f64_le()];
        let bus_voltage = buf.get_f64_le();
        let demand_pos = buf.get_f64_le();
        let demand_vel = buf.get_f64_le();

        let state_code = buf.get_f64_le();
        let enabled_code = buf.get_f64_le();
        let fault_code = buf.get_f64_le();
        let state = ControllerState::from_codes(state_code, enabled_code, fault_code)?;

        let rate_cmd = [buf.get_f64_le(), buf.get_f64_le()];
        let velocity_feedback = [buf.get_f64_le(), buf.get_f64_le()];
        let current_pos = buf.get_f64_le();
        let odometer = buf.get_f64_le();
        let set_pos = buf.get_f64_le();

        let mut simulink_flags = 0u16;
        for bit in 0..SIMULINK_FLAG_COUNT {
            if buf.get_f64_le() != 0.0 {
                simulink_flags |= 1 << bit;
            }
        }

        Ok(Self {
            status_word,
            latching_fault,
            input_pin_states,
            motor_torque,
            copley_status,
            application_status,
            motor_current,
            bus_voltage,
            demand_pos,
            demand_vel,
            state,
            rate_cmd,
            velocity_feedback,
            current_pos,
            odometer,
            set_pos,
            simulink_flags,
        })
    }
}
