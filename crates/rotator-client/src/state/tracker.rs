//! 控制器状态转换规则
//!
//! [`track`] 是纯函数：给定上一状态、本帧观测到的状态和上下文，
//! 返回新状态以及（如有）非法转换记录。观测值总是被采纳，
//! 非法转换只用于告警，不会阻止状态更新。

use rotator_protocol::{ControllerState, EnabledSubstate, FaultSubstate};

/// 判定转换合法性所需的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackContext {
    /// 当前 Fault 期间是否已有 ClearError 被控制器接受
    pub clear_error_accepted: bool,
}

/// 不在转换表中的状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnexpectedTransition {
    pub from: ControllerState,
    pub to: ControllerState,
}

/// 一次观测的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: ControllerState,
    /// 状态是否发生变化（首次观测也算变化）
    pub changed: bool,
    pub anomaly: Option<UnexpectedTransition>,
}

/// 转换表
pub fn is_legal(from: ControllerState, to: ControllerState, ctx: TrackContext) -> bool {
    use ControllerState::{Enabled, Fault, Standby};
    use EnabledSubstate as E;
    use FaultSubstate as F;

    if from == to {
        return true;
    }

    match (from, to) {
        (Standby, Enabled(E::Stationary)) => true,
        (Enabled(E::Stationary), Enabled(E::MovingPt2Pt | E::ConstVel)) => true,
        (Enabled(E::MovingPt2Pt | E::ConstVel), Enabled(E::Stationary)) => true,
        (Enabled(_), Enabled(E::SlewingAndTracking | E::ControlledStopping)) => true,
        (Enabled(E::ControlledStopping), Enabled(E::Stationary)) => true,
        (Enabled(_) | Standby, Fault(F::EmergencyStopping)) => true,
        (Fault(F::EmergencyStopping), Fault(F::WaitClearError)) => true,
        (Fault(F::WaitClearError), Standby) => ctx.clear_error_accepted,
        (Enabled(_), Standby) => true,
        _ => false,
    }
}

/// 根据观测值推进状态
pub fn track(prev: Option<ControllerState>, observed: ControllerState, ctx: TrackContext) -> Transition {
    let Some(from) = prev else {
        return Transition {
            state: observed,
            changed: true,
            anomaly: None,
        };
    };

    let anomaly = (!is_legal(from, observed, ctx)).then_some(UnexpectedTransition { from, to: observed });

    Transition {
        state: observed,
        changed: from != observed,
        anomaly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControllerState::{Enabled, Fault, Standby};
    use EnabledSubstate as E;
    use FaultSubstate as F;

    const ALL_STATES: [ControllerState; 8] = [
        Standby,
        Enabled(E::Stationary),
        Enabled(E::MovingPt2Pt),
        Enabled(E::SlewingAndTracking),
        Enabled(E::ControlledStopping),
        Enabled(E::ConstVel),
        Fault(F::EmergencyStopping),
        Fault(F::WaitClearError),
    ];

    fn ctx() -> TrackContext {
        TrackContext::default()
    }

    #[test]
    fn test_first_observation_is_adopted_silently() {
        for state in ALL_STATES {
            let t = track(None, state, ctx());
            assert_eq!(t.state, state);
            assert!(t.changed);
            assert!(t.anomaly.is_none());
        }
    }

    #[test]
    fn test_same_state_is_noop() {
        for state in ALL_STATES {
            let t = track(Some(state), state, ctx());
            assert!(!t.changed);
            assert!(t.anomaly.is_none());
        }
    }

    #[test]
    fn test_operating_sequence_is_legal() {
        let sequence = [
            Standby,
            Enabled(E::Stationary),
            Enabled(E::MovingPt2Pt),
            Enabled(E::Stationary),
            Enabled(E::ConstVel),
            Enabled(E::ControlledStopping),
            Enabled(E::Stationary),
            Enabled(E::SlewingAndTracking),
            Fault(F::EmergencyStopping),
            Fault(F::WaitClearError),
        ];
        let mut prev = None;
        for state in sequence {
            let t = track(prev, state, ctx());
            assert!(t.anomaly.is_none(), "{:?} -> {} flagged", prev, state);
            prev = Some(t.state);
        }
    }

    #[test]
    fn test_clear_error_requires_acceptance() {
        let from = Fault(F::WaitClearError);

        let t = track(Some(from), Standby, ctx());
        assert_eq!(t.anomaly, Some(UnexpectedTransition { from, to: Standby }));
        assert_eq!(t.state, Standby);

        let accepted = TrackContext {
            clear_error_accepted: true,
        };
        assert!(track(Some(from), Standby, accepted).anomaly.is_none());
    }

    #[test]
    fn test_out_of_table_changes_report_one_anomaly() {
        let illegal = [
            (Standby, Enabled(E::MovingPt2Pt)),
            (Standby, Fault(F::WaitClearError)),
            (Fault(F::WaitClearError), Enabled(E::Stationary)),
            (Fault(F::EmergencyStopping), Standby),
            (Enabled(E::MovingPt2Pt), Enabled(E::ConstVel)),
        ];
        for (from, to) in illegal {
            let t = track(Some(from), to, ctx());
            assert_eq!(t.state, to);
            assert_eq!(t.anomaly, Some(UnexpectedTransition { from, to }));
        }
    }

    #[test]
    fn test_any_enabled_substate_may_stop_or_fault() {
        for from in ALL_STATES.into_iter().filter(ControllerState::is_enabled) {
            assert!(is_legal(from, Enabled(E::ControlledStopping), ctx()));
            assert!(is_legal(from, Fault(F::EmergencyStopping), ctx()));
            assert!(is_legal(from, Standby, ctx()));
        }
    }
}
