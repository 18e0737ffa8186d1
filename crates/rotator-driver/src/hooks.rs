//! 钩子系统
//!
//! 上层（状态跟踪、命令分发）通过注册 [`SessionCallback`] 接收 IO 线程产生的事件。
//!
//! # 使用示例
//!
//! ```rust
//! use rotator_driver::hooks::{HookManager, SessionCallback};
//! use rotator_driver::{ConnectionState, DriverEvent};
//! use std::sync::Arc;
//!
//! struct PrintState;
//!
//! impl SessionCallback for PrintState {
//!     fn on_event(&self, event: &DriverEvent) {
//!         if let DriverEvent::ConnectionStateChanged { to, .. } = event {
//!             println!("connection: {}", to);
//!         }
//!     }
//! }
//!
//! let mut hooks = HookManager::new();
//! hooks.add_callback(Arc::new(PrintState));
//! hooks.trigger_all(&DriverEvent::ConnectionStateChanged {
//!     from: ConnectionState::Disconnected,
//!     to: ConnectionState::Connecting,
//! });
//! ```

use crate::event::DriverEvent;
use std::sync::Arc;
use std::time::Instant;

/// 会话回调 Trait
///
/// 回调在 IO 线程上同步执行（连接状态变化也可能在调用 `connect`/`disconnect`
/// 的线程上触发），实现必须快速返回；需要转发给慢速消费者时使用 `try_send`。
pub trait SessionCallback: Send + Sync {
    fn on_event(&self, event: &DriverEvent);

    /// IO 循环每轮调用一次（用于截止时间检查）
    ///
    /// 默认为空操作。
    fn on_tick(&self, now: Instant) {
        let _ = now;
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，需要外部同步（`RwLock<HookManager>`）。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn SessionCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn SessionCallback>) {
        self.callbacks.push(callback);
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn trigger_all(&self, event: &DriverEvent) {
        for callback in self.callbacks.iter() {
            callback.on_event(event);
        }
    }

    pub fn trigger_tick(&self, now: Instant) {
        for callback in self.callbacks.iter() {
            callback.on_tick(now);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
