//! 会话共享上下文
//!
//! 连接状态、钩子和指标在调用方线程与 IO 线程之间共享。

use crate::event::{ConnectionState, DriverEvent};
use crate::hooks::HookManager;
use crate::metrics::SessionMetrics;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{error, info};

pub struct SessionContext {
    state: AtomicU8,
    /// 事件回调（读多写少）
    pub hooks: RwLock<HookManager>,
    pub metrics: SessionMetrics,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            hooks: RwLock::new(HookManager::new()),
            metrics: SessionMetrics::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 无条件切换到 `to`；状态确实变化时发布 `ConnectionStateChanged`
    pub(crate) fn transition(&self, to: ConnectionState) -> bool {
        let from = ConnectionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        if from == to {
            return false;
        }
        self.announce(from, to);
        true
    }

    /// 仅当当前状态为 `from` 时切换（IO 线程判定连接丢失时使用）
    pub(crate) fn transition_from(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped && from != to {
            self.announce(from, to);
        }
        swapped
    }

    fn announce(&self, from: ConnectionState, to: ConnectionState) {
        info!("Connection state: {} -> {}", from, to);
        self.publish(&DriverEvent::ConnectionStateChanged { from, to });
    }

    pub fn publish(&self, event: &DriverEvent) {
        match self.hooks.read() {
            Ok(hooks) => hooks.trigger_all(event),
            Err(_) => error!("Hook manager lock poisoned, dropping event"),
        }
    }

    pub(crate) fn tick(&self, now: Instant) {
        if let Ok(hooks) = self.hooks.read() {
            hooks.trigger_tick(now);
        }
    }
}
