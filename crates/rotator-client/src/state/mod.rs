//! 控制器状态跟踪
//!
//! [`ControllerStateTracker`] 在 IO 线程上逐帧调用 [`tracker::track`]，
//! 并维护 Fault 期间的故障集合与 ClearError 接受标记。

pub mod tracker;

pub use tracker::{Transition, TrackContext, UnexpectedTransition, track};

use rotator_protocol::{ControllerState, FaultSet};

/// 一帧遥测对跟踪器的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateUpdate {
    pub previous: Option<ControllerState>,
    pub transition: Transition,
    /// 当前保留的故障集合
    pub faults: FaultSet,
}

#[derive(Debug, Default)]
pub struct ControllerStateTracker {
    current: Option<ControllerState>,
    active_faults: FaultSet,
    context: TrackContext,
}

impl ControllerStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一次观测
    ///
    /// 进入 Fault 时记录本帧的故障集合，离开 Fault 前一直保留。
    pub fn observe(&mut self, observed: ControllerState, frame_faults: FaultSet) -> StateUpdate {
        let previous = self.current;
        let transition = track(previous, observed, self.context);

        let was_fault = previous.is_some_and(|s| s.is_fault());
        if observed.is_fault() && !was_fault {
            self.active_faults = frame_faults;
            self.context.clear_error_accepted = false;
        } else if !observed.is_fault() && was_fault {
            self.active_faults = FaultSet::empty();
            self.context.clear_error_accepted = false;
        }

        self.current = Some(transition.state);

        StateUpdate {
            previous,
            transition,
            faults: self.active_faults,
        }
    }

    /// 控制器已接受 ClearError
    pub fn note_clear_error_accepted(&mut self) {
        if self.current.is_some_and(|s| s.is_fault()) {
            self.context.clear_error_accepted = true;
        }
    }

    pub fn current(&self) -> Option<ControllerState> {
        self.current
    }

    pub fn active_faults(&self) -> FaultSet {
        self.active_faults
    }

    /// 新连接开始时清空（首帧重新静默采纳）
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
