//! 故障分类
//!
//! 把遥测中的应用状态字、Copley 状态、锁存故障寄存器和 Simulink 标志
//! 归并为一个固定的 [`FaultKind`] 集合。集合是无序的：同时出现多个故障时
//! 不定义 "主故障"，展示顺序由调用方决定。

use crate::status::{ApplicationStatus, CopleyStatus, LatchingFault, SimulinkFlags};
use crate::telemetry::Telemetry;
use bilge::prelude::*;
use std::fmt;

/// 硬件故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FaultKind {
    SafetyInterlock = 0,
    PositiveLimitSwitch = 1,
    NegativeLimitSwitch = 2,
    FollowingError = 3,
    EthercatNotReady = 4,
    SimulinkFault = 5,
    DriveFault = 6,
    OverVoltage = 7,
    UnderVoltage = 8,
    AmplifierOverTemperature = 9,
    LinearEncoderFault = 10,
    FeedbackError = 11,
    MotorPhasingError = 12,
    DataFlashCrcFailure = 13,
    AmplifierInternalError = 14,
    FpgaFailure = 15,
    ShortCircuit = 16,
    PositionFeedbackFault = 17,
    /// 警告，不是故障
    VoltageOutputLimited = 18,
}

impl FaultKind {
    pub const ALL: [FaultKind; 19] = [
        FaultKind::SafetyInterlock,
        FaultKind::PositiveLimitSwitch,
        FaultKind::NegativeLimitSwitch,
        FaultKind::FollowingError,
        FaultKind::EthercatNotReady,
        FaultKind::SimulinkFault,
        FaultKind::DriveFault,
        FaultKind::OverVoltage,
        FaultKind::UnderVoltage,
        FaultKind::AmplifierOverTemperature,
        FaultKind::LinearEncoderFault,
        FaultKind::FeedbackError,
        FaultKind::MotorPhasingError,
        FaultKind::DataFlashCrcFailure,
        FaultKind::AmplifierInternalError,
        FaultKind::FpgaFailure,
        FaultKind::ShortCircuit,
        FaultKind::PositionFeedbackFault,
        FaultKind::VoltageOutputLimited,
    ];

    /// 是否只是警告
    pub fn is_warning(&self) -> bool {
        matches!(self, FaultKind::VoltageOutputLimited)
    }

    /// 硬件自检失败：本次会话内无法通过 clear-error 恢复，需要外部干预
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FaultKind::DataFlashCrcFailure | FaultKind::AmplifierInternalError | FaultKind::FpgaFailure
        )
    }

    fn bit(&self) -> u32 {
        1 << (*self as u8)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FaultKind::SafetyInterlock => "safety interlock",
            FaultKind::PositiveLimitSwitch => "positive limit switch",
            FaultKind::NegativeLimitSwitch => "negative limit switch",
            FaultKind::FollowingError => "following error",
            FaultKind::EthercatNotReady => "EtherCAT not ready",
            FaultKind::SimulinkFault => "simulink fault",
            FaultKind::DriveFault => "drive fault",
            FaultKind::OverVoltage => "over voltage",
            FaultKind::UnderVoltage => "under voltage",
            FaultKind::AmplifierOverTemperature => "amplifier over temperature",
            FaultKind::LinearEncoderFault => "linear encoder fault",
            FaultKind::FeedbackError => "feedback error",
            FaultKind::MotorPhasingError => "motor phasing error",
            FaultKind::DataFlashCrcFailure => "data flash CRC failure",
            FaultKind::AmplifierInternalError => "amplifier internal error",
            FaultKind::FpgaFailure => "FPGA failure",
            FaultKind::ShortCircuit => "short circuit",
            FaultKind::PositionFeedbackFault => "position feedback fault",
            FaultKind::VoltageOutputLimited => "voltage output limited",
        };
        f.write_str(text)
    }
}

/// 无序故障集合（位掩码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultSet(u32);

impl FaultSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, kind: FaultKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: FaultKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = FaultKind> + '_ {
        FaultKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }

    /// 除警告外是否还有真正的故障
    pub fn has_faults(&self) -> bool {
        self.iter().any(|kind| !kind.is_warning())
    }

    /// 是否包含需要外部干预的永久故障
    pub fn has_permanent(&self) -> bool {
        self.iter().any(|kind| kind.is_permanent())
    }

    /// 从一帧遥测推导当前活动的故障集合
    pub fn from_telemetry(telemetry: &Telemetry) -> Self {
        let mut set = FaultSet::empty();

        let app = ApplicationStatus::from(u32::new(telemetry.application_status));
        let app_bits = [
            (app.following_error(), FaultKind::FollowingError),
            (app.safety_interlock(), FaultKind::SafetyInterlock),
            (app.extend_limit_switch(), FaultKind::PositiveLimitSwitch),
            (app.retract_limit_switch(), FaultKind::NegativeLimitSwitch),
            (app.ethercat_not_ready(), FaultKind::EthercatNotReady),
            (app.drive_fault(), FaultKind::DriveFault),
            (app.simulink_fault(), FaultKind::SimulinkFault),
            (app.linear_encoder_fault(), FaultKind::LinearEncoderFault),
        ];
        set.extend_active(app_bits);

        for raw in telemetry.copley_status {
            let copley = CopleyStatus::from(u32::new(raw));
            set.extend_active([
                (copley.short_circuit(), FaultKind::ShortCircuit),
                (copley.amp_over_temperature(), FaultKind::AmplifierOverTemperature),
                (copley.over_voltage(), FaultKind::OverVoltage),
                (copley.under_voltage(), FaultKind::UnderVoltage),
                (copley.feedback_error(), FaultKind::FeedbackError),
                (copley.motor_phasing_error(), FaultKind::MotorPhasingError),
                (copley.voltage_output_limited(), FaultKind::VoltageOutputLimited),
                (copley.negative_limit_switch(), FaultKind::NegativeLimitSwitch),
                (copley.positive_limit_switch(), FaultKind::PositiveLimitSwitch),
            ]);
        }

        for raw in telemetry.latching_fault {
            let latching = LatchingFault::from(u16::new(raw));
            set.extend_active([
                (latching.data_flash_crc_failure(), FaultKind::DataFlashCrcFailure),
                (latching.amp_internal_error(), FaultKind::AmplifierInternalError),
                (latching.short_circuit(), FaultKind::ShortCircuit),
                (latching.amp_over_temperature(), FaultKind::AmplifierOverTemperature),
                (latching.over_voltage(), FaultKind::OverVoltage),
                (latching.under_voltage(), FaultKind::UnderVoltage),
                (latching.feedback_fault(), FaultKind::FeedbackError),
                (latching.phasing_error(), FaultKind::MotorPhasingError),
                (latching.fpga_failure_1() || latching.fpga_failure_2(), FaultKind::FpgaFailure),
            ]);
        }

        let flags = SimulinkFlags::from(u16::new(telemetry.simulink_flags));
        set.extend_active([
            (flags.following_error(), FaultKind::FollowingError),
            (flags.position_feedback_fault(), FaultKind::PositionFeedbackFault),
        ]);

        set
    }

    fn extend_active<const N: usize>(&mut self, bits: [(bool, FaultKind); N]) {
        for (active, kind) in bits {
            if active {
                self.insert(kind);
            }
        }
    }
}

impl FromIterator<FaultKind> for FaultSet {
    fn from_iter<I: IntoIterator<Item = FaultKind>>(iter: I) -> Self {
        let mut set = FaultSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kind_classification() {
        assert!(FaultKind::VoltageOutputLimited.is_warning());
        assert!(!FaultKind::FollowingError.is_warning());

        assert!(FaultKind::DataFlashCrcFailure.is_permanent());
        assert!(FaultKind::AmplifierInternalError.is_permanent());
        assert!(FaultKind::FpgaFailure.is_permanent());
        assert!(!FaultKind::OverVoltage.is_permanent());
    }

    #[test]
    fn test_empty_telemetry_has_no_faults() {
        let telemetry = Telemetry::default();
        assert!(FaultSet::from_telemetry(&telemetry).is_empty());
    }

    #[test]
    fn test_application_status_faults() {
        let telemetry = Telemetry {
            // following error + safety interlock + drive fault + GUI connected
            application_status: 0x2045,
            ..Default::default()
        };
        let set = FaultSet::from_telemetry(&telemetry);
        assert!(set.contains(FaultKind::FollowingError));
        assert!(set.contains(FaultKind::SafetyInterlock));
        assert!(set.contains(FaultKind::DriveFault));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_drive_register_faults_merge_axes() {
        let telemetry = Telemetry {
            copley_status: [0x0001, 0x0100],
            latching_fault: [0x0000, 0x0800],
            ..Default::default()
        };
        let set = FaultSet::from_telemetry(&telemetry);
        assert!(set.contains(FaultKind::ShortCircuit));
        assert!(set.contains(FaultKind::VoltageOutputLimited));
        assert!(set.contains(FaultKind::FpgaFailure));
        assert!(set.has_permanent());
        assert!(set.has_faults());
    }

    #[test]
    fn test_warning_only_set_has_no_faults() {
        let set: FaultSet = [FaultKind::VoltageOutputLimited].into_iter().collect();
        assert!(!set.is_empty());
        assert!(!set.has_faults());
    }

    #[test]
    fn test_simulink_flag_faults() {
        let telemetry = Telemetry {
            // following error (Bit 5) + position feedback fault (Bit 8)
            simulink_flags: 0x0120,
            ..Default::default()
        };
        let set = FaultSet::from_telemetry(&telemetry);
        assert!(set.contains(FaultKind::FollowingError));
        assert!(set.contains(FaultKind::PositionFeedbackFault));
    }

    #[test]
    fn test_iter_yields_each_kind_once() {
        let set: FaultSet = [
            FaultKind::OverVoltage,
            FaultKind::OverVoltage,
            FaultKind::ShortCircuit,
        ]
        .into_iter()
        .collect();
        let kinds: Vec<_> = set.iter().collect();
        assert_eq!(kinds, vec![FaultKind::OverVoltage, FaultKind::ShortCircuit]);
    }
}
