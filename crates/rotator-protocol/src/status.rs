//! 状态寄存器位域
//!
//! 遥测帧中携带若干原始寄存器，这里用 bilge 位域给出逐位含义。
//! 位序为 LSB first：字段声明顺序即 Bit 0, Bit 1, ...

use bilge::prelude::*;

/// 应用状态字（32 位，低 16 位有定义）
#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct ApplicationStatus {
    pub following_error: bool,      // Bit 0
    pub move_complete: bool,        // Bit 1
    pub gui_connected: bool,        // Bit 2
    pub relative_move: bool,        // Bit 3
    pub synchronous_move: bool,     // Bit 4
    pub invalid_command: bool,      // Bit 5
    pub safety_interlock: bool,     // Bit 6
    pub extend_limit_switch: bool,  // Bit 7
    pub retract_limit_switch: bool, // Bit 8
    pub ethercat_not_ready: bool,   // Bit 9
    pub command_by_csc: bool,       // Bit 10 (0x400)
    pub motion_timeout: bool,       // Bit 11
    pub csc_connected: bool,        // Bit 12
    pub drive_fault: bool,          // Bit 13
    pub simulink_fault: bool,       // Bit 14
    pub linear_encoder_fault: bool, // Bit 15
    pub reserved: u16,              // Bit 16-31
}

/// Copley 驱动器状态寄存器（0x2180）
#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct CopleyStatus {
    pub short_circuit: bool,               // Bit 0
    pub amp_over_temperature: bool,        // Bit 1
    pub over_voltage: bool,                // Bit 2
    pub under_voltage: bool,               // Bit 3
    pub motor_over_temperature: bool,      // Bit 4
    pub feedback_error: bool,              // Bit 5
    pub motor_phasing_error: bool,         // Bit 6
    pub current_output_limited: bool,      // Bit 7
    pub voltage_output_limited: bool,      // Bit 8
    pub negative_limit_switch: bool,       // Bit 9
    pub positive_limit_switch: bool,       // Bit 10
    pub enable_input_not_active: bool,     // Bit 11
    pub disabled_by_software: bool,        // Bit 12
    pub trying_to_stop: bool,              // Bit 13
    pub motor_brake_active: bool,          // Bit 14
    pub pwm_outputs_disabled: bool,        // Bit 15
    pub positive_software_limit: bool,     // Bit 16
    pub negative_software_limit: bool,     // Bit 17
    pub tracking_error: bool,              // Bit 18
    pub tracking_warning: bool,            // Bit 19
    pub in_reset: bool,                    // Bit 20
    pub position_wrapped: bool,            // Bit 21
    pub amplifier_fault: bool,             // Bit 22
    pub at_velocity_limit: bool,           // Bit 23
    pub at_acceleration_limit: bool,       // Bit 24
    pub position_error_over_window: bool,  // Bit 25
    pub home_switch_active: bool,          // Bit 26
    pub in_motion: bool,                   // Bit 27
    pub velocity_error_over_window: bool,  // Bit 28
    pub phasing_not_set: bool,             // Bit 29
    pub command_fault: bool,               // Bit 30
    pub reserved: u1,                      // Bit 31
}

/// 锁存故障寄存器（0x2183）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct LatchingFault {
    pub data_flash_crc_failure: bool,     // Bit 0
    pub amp_internal_error: bool,         // Bit 1
    pub short_circuit: bool,              // Bit 2
    pub amp_over_temperature: bool,       // Bit 3
    pub motor_over_temperature: bool,     // Bit 4
    pub over_voltage: bool,               // Bit 5
    pub under_voltage: bool,              // Bit 6
    pub feedback_fault: bool,             // Bit 7
    pub phasing_error: bool,              // Bit 8
    pub tracking_error: bool,             // Bit 9
    pub over_current: bool,               // Bit 10
    pub fpga_failure_1: bool,             // Bit 11
    pub command_input_lost: bool,         // Bit 12
    pub fpga_failure_2: bool,             // Bit 13
    pub safety_circuit_fault: bool,       // Bit 14
    pub unable_to_control_current: bool,  // Bit 15
}

/// CiA 402 状态字（0x6041）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct StatusWord {
    pub ready_to_switch_on: bool,    // Bit 0
    pub switched_on: bool,           // Bit 1
    pub operation_enabled: bool,     // Bit 2
    pub fault_latched: bool,         // Bit 3
    pub voltage_enabled: bool,       // Bit 4
    pub reserved_5: u1,              // Bit 5
    pub switch_on_disabled: bool,    // Bit 6
    pub warning: bool,               // Bit 7
    pub trajectory_aborted: bool,    // Bit 8
    pub remote: bool,                // Bit 9
    pub reserved_10: u1,             // Bit 10
    pub internal_limit_active: bool, // Bit 11
    pub reserved_high: u4,           // Bit 12-15
}

/// Simulink 标志字
///
/// 控制器以 11 个独立的 f64 上报，非零即置位；这里压缩为一个字。
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct SimulinkFlags {
    pub initialization_complete: bool, // Bit 0
    pub slew_complete: bool,           // Bit 1
    pub pt2pt_move_complete: bool,     // Bit 2
    pub new_pt2pt_command: bool,       // Bit 3
    pub stop_complete: bool,           // Bit 4
    pub following_error: bool,         // Bit 5
    pub move_success: bool,            // Bit 6
    pub tracking_success: bool,        // Bit 7
    pub position_feedback_fault: bool, // Bit 8
    pub tracking_lost: bool,           // Bit 9
    pub no_new_track_cmd_error: bool,  // Bit 10
    pub reserved: u5,                  // Bit 11-15
}

/// Simulink 标志的数量（线上逐个以 f64 传输）
pub const SIMULINK_FLAG_COUNT: usize = 11;
