//! 模拟控制器的状态模型
//!
//! 纯状态机：`handle` 执行一条命令，`step` 推进一个遥测周期。
//! 不涉及网络，便于单独测试。

use rotator_protocol::{
    Command, CommandSource, ControllerConfig, ControllerState, EnabledSubstate, FaultSubstate, MAX_ACCELERATION,
    MAX_JERK, MAX_ROTATION, MAX_VELOCITY, NUM_AXES, Telemetry,
};

/// 每个周期点到点运动的步长（deg）
pub const CYCLE_MOVE_POSITION_DEG: f64 = 5.0;

const MOTOR_CURRENT: f64 = 0.8;
const BUS_VOLTAGE: f64 = 330.0;
const INPUT_PIN_STATES: u32 = 0x380E0;
const COPLEY_STATUS: u32 = 0xF000;
const STATUS_WORD_ENABLED: u16 = 0x631;
const STATUS_WORD_DISABLED: u16 = 0x670;

// 应用状态字位
const APP_FOLLOWING_ERROR: u32 = 0x1;
const APP_MOVE_COMPLETE: u32 = 0x2;
const APP_GUI_CONNECTED: u32 = 0x4;

// Simulink 标志位
const FLAG_INITIALIZATION_COMPLETE: u16 = 0x1;
const FLAG_PT2PT_MOVE_COMPLETE: u16 = 0x4;
const FLAG_FOLLOWING_ERROR: u16 = 0x20;

pub const NOT_SUPPORTED: &str = "Not supported in the simulator.";
pub const POSITION_NOT_SET: &str = "Must set the position first.";

#[derive(Debug, Clone)]
pub struct SimulatedController {
    telemetry: Telemetry,
    config: ControllerConfig,
    csc_commander: bool,
    commanded_position: Option<f64>,
    fault_condition: bool,
    move_complete: bool,
    config_changed: bool,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new(ControllerState::Standby, 0.0)
    }
}

impl SimulatedController {
    pub fn new(initial_state: ControllerState, initial_position: f64) -> Self {
        let mut sim = Self {
            telemetry: Telemetry {
                state: initial_state,
                current_pos: initial_position,
                demand_pos: initial_position,
                set_pos: initial_position,
                bus_voltage: BUS_VOLTAGE,
                ..Default::default()
            },
            config: default_config(),
            csc_commander: false,
            commanded_position: None,
            fault_condition: false,
            move_complete: false,
            config_changed: true,
        };
        sim.config.drives_enabled = initial_state.is_enabled();
        sim.refresh_telemetry();
        sim
    }

    /// 执行一条命令；`Err` 为 NoAck 的原因
    pub fn handle(&mut self, command: &Command) -> Result<(), String> {
        let result = self.dispatch(command);
        if !matches!(command, Command::PositionSet { .. }) {
            self.commanded_position = None;
        }
        result
    }

    fn dispatch(&mut self, command: &Command) -> Result<(), String> {
        if self.csc_commander && !matches!(command, Command::SwitchCommandSource { .. }) {
            return Err("The CSC is the commander.".to_string());
        }

        match *command {
            Command::Enable => {
                self.require_state(ControllerState::Standby)?;
                self.telemetry.state = ControllerState::Enabled(EnabledSubstate::Stationary);
                self.set_drives_enabled(true);
            },
            Command::StandBy => {
                if !self.telemetry.state.is_enabled() {
                    return Err(format!("Cannot go to Standby from {}.", self.telemetry.state));
                }
                self.telemetry.state = ControllerState::Standby;
                self.set_drives_enabled(false);
            },
            Command::ClearError => {
                self.require_state(ControllerState::Fault(FaultSubstate::WaitClearError))?;
                if self.fault_condition {
                    return Err("The fault condition is still active.".to_string());
                }
                self.telemetry.state = ControllerState::Standby;
            },
            Command::Move => {
                self.require_stationary()?;
                let target = self.commanded_position.ok_or_else(|| POSITION_NOT_SET.to_string())?;
                self.telemetry.demand_pos = target;
                self.telemetry.set_pos = target;
                self.move_complete = false;
                self.telemetry.state = ControllerState::Enabled(EnabledSubstate::MovingPt2Pt);
            },
            Command::Stop => {
                if !self.telemetry.state.is_enabled() {
                    return Err(format!("Cannot stop in {}.", self.telemetry.state));
                }
                self.telemetry.state = ControllerState::Enabled(EnabledSubstate::Stationary);
                self.telemetry.velocity_feedback = [0.0; NUM_AXES];
            },
            Command::PositionSet { position } => {
                self.require_stationary()?;
                check_range(position, "position", -MAX_ROTATION, MAX_ROTATION)?;
                self.commanded_position = Some(position);
            },
            Command::SwitchCommandSource { to } => {
                self.csc_commander = to == CommandSource::Csc;
            },
            Command::ConfigVelocity { limit } => {
                self.require_stationary()?;
                check_positive(limit, "velocity", MAX_VELOCITY)?;
                self.config.velocity_limit = limit;
                self.config_changed = true;
            },
            Command::ConfigAcceleration { limit } => {
                self.require_stationary()?;
                check_positive(limit, "acceleration", MAX_ACCELERATION)?;
                self.config.accel_limit = limit;
                self.config_changed = true;
            },
            Command::ConfigAccelerationEmergency { limit } => {
                self.require_stationary()?;
                check_positive(limit, "emergency acceleration", MAX_ACCELERATION)?;
                self.config.emergency_accel_limit = limit;
                self.config_changed = true;
            },
            Command::ConfigJerkEmergency { limit } => {
                self.require_stationary()?;
                check_positive(limit, "emergency jerk", MAX_JERK)?;
                self.config.emergency_jerk_limit = limit;
                self.config_changed = true;
            },
            Command::EnableDrives { .. }
            | Command::ConstVel
            | Command::SetConstantVel { .. }
            | Command::MaskLimitSwitch
            | Command::DisableUpperPosLimit
            | Command::DisableLowerPosLimit
            | Command::ConfigJerk { .. } => return Err(NOT_SUPPORTED.to_string()),
        }
        Ok(())
    }

    fn require_state(&self, expected: ControllerState) -> Result<(), String> {
        if self.telemetry.state == expected {
            Ok(())
        } else {
            Err(format!("Must be in {} (current: {}).", expected, self.telemetry.state))
        }
    }

    /// Standby 或 Enabled/Stationary
    fn require_stationary(&self) -> Result<(), String> {
        let state = self.telemetry.state;
        if state.is_standby() || state.is_stationary() {
            Ok(())
        } else {
            Err(format!("Must be stationary (current: {}).", state))
        }
    }

    fn set_drives_enabled(&mut self, enabled: bool) {
        if self.config.drives_enabled != enabled {
            self.config.drives_enabled = enabled;
            self.config_changed = true;
        }
    }

    /// 推进一个遥测周期
    pub fn step(&mut self) {
        let state = self.telemetry.state;
        if self.fault_condition && (state.is_enabled() || state.is_standby()) {
            self.telemetry.state = ControllerState::Fault(FaultSubstate::EmergencyStopping);
            self.telemetry.velocity_feedback = [0.0; NUM_AXES];
            self.set_drives_enabled(false);
        } else if state == ControllerState::Fault(FaultSubstate::EmergencyStopping) {
            self.telemetry.state = ControllerState::Fault(FaultSubstate::WaitClearError);
        } else if state == ControllerState::Enabled(EnabledSubstate::MovingPt2Pt) {
            self.advance_move();
        }

        self.refresh_telemetry();
    }

    fn advance_move(&mut self) {
        let current = self.telemetry.current_pos;
        let target = self.telemetry.demand_pos;
        let (done, position) = move_toward(current, target, CYCLE_MOVE_POSITION_DEG);
        let velocity = if done { 0.0 } else { (target - current).signum() * MAX_VELOCITY };

        self.telemetry.odometer += (position - current).abs();
        self.telemetry.current_pos = position;
        self.telemetry.velocity_feedback = [velocity; NUM_AXES];
        self.telemetry.demand_vel = velocity;

        if done {
            self.telemetry.state = ControllerState::Enabled(EnabledSubstate::Stationary);
            self.commanded_position = None;
            self.move_complete = true;
        }
    }

    fn refresh_telemetry(&mut self) {
        let drives_enabled = self.config.drives_enabled;
        let t = &mut self.telemetry;

        t.latching_fault = [0; NUM_AXES];
        t.input_pin_states = INPUT_PIN_STATES;
        t.copley_status = [COPLEY_STATUS; NUM_AXES];
        t.status_word = [if drives_enabled {
            STATUS_WORD_ENABLED
        } else {
            STATUS_WORD_DISABLED
        }; NUM_AXES];
        t.motor_current = [if drives_enabled { MOTOR_CURRENT } else { 0.0 }; NUM_AXES];
        t.bus_voltage = BUS_VOLTAGE;

        let mut app = APP_GUI_CONNECTED;
        let mut flags = FLAG_INITIALIZATION_COMPLETE;
        if self.csc_commander {
            app |= CommandSource::CSC_BIT;
        }
        if self.fault_condition {
            app |= APP_FOLLOWING_ERROR;
            flags |= FLAG_FOLLOWING_ERROR;
        }
        if self.move_complete {
            app |= APP_MOVE_COMPLETE;
            flags |= FLAG_PT2PT_MOVE_COMPLETE;
        }
        t.application_status = app;
        t.simulink_flags = flags;
    }

    /// 注入跟随误差：下一周期进入 Fault/EmergencyStopping
    pub fn inject_following_error(&mut self) {
        self.fault_condition = true;
        self.refresh_telemetry();
    }

    /// 清除故障条件（之后才能 ClearError）
    pub fn clear_fault_condition(&mut self) {
        self.fault_condition = false;
        self.refresh_telemetry();
    }

    pub fn set_command_source(&mut self, source: CommandSource) {
        self.csc_commander = source == CommandSource::Csc;
        self.refresh_telemetry();
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    pub fn state(&self) -> ControllerState {
        self.telemetry.state
    }

    /// 配置自上次调用以来是否变化
    pub fn take_config_changed(&mut self) -> bool {
        std::mem::take(&mut self.config_changed)
    }
}

fn default_config() -> ControllerConfig {
    ControllerConfig {
        velocity_limit: MAX_VELOCITY,
        accel_limit: MAX_ACCELERATION,
        pos_error_threshold: 0.1,
        upper_pos_limit: MAX_ROTATION,
        lower_pos_limit: -MAX_ROTATION,
        following_error_threshold: 0.1,
        track_success_pos_threshold: 0.01,
        tracking_lost_timeout: 5.0,
        emergency_jerk_limit: MAX_JERK,
        emergency_accel_limit: MAX_ACCELERATION,
        disable_limit_max_time: 120.0,
        max_velocity_limit: MAX_VELOCITY,
        drives_enabled: false,
    }
}

fn check_positive(value: f64, name: &str, max: f64) -> Result<(), String> {
    if value > 0.0 && value <= max {
        Ok(())
    } else {
        Err(format!("{}={} not in range (0, {}]", name, value, max))
    }
}

fn check_range(value: f64, name: &str, min: f64, max: f64) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{}={} not in range [{}, {}]", name, value, min, max))
    }
}

/// 向目标移动一步，返回 `(是否到达, 新位置)`
fn move_toward(current: f64, target: f64, step: f64) -> (bool, f64) {
    if current == target {
        return (true, current);
    }
    let next = current + (target - current).signum() * step;
    if (target > current && next >= target) || (target < current && next <= target) {
        (true, target)
    } else {
        (false, next)
    }
}
