//! 会话事件总线
//!
//! 每个订阅者一个有界通道，发布使用 `try_send`：
//! 订阅者处理不过来时事件被丢弃并计数，不会阻塞 IO 线程。

use crate::error::{CommandError, CommandOutcome};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use rotator_driver::{ConnectionState, TelemetrySample};
use rotator_protocol::{Command, CommandSource, ControllerConfig, ControllerState, FaultSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// 默认订阅队列容量
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionStateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    TelemetryUpdated(TelemetrySample),
    ConfigurationUpdated(ControllerConfig),
    ControllerStateChanged {
        from: Option<ControllerState>,
        to: ControllerState,
        /// Fault 期间保留的故障集合，其他状态为空
        faults: FaultSet,
    },
    UnexpectedTransition {
        from: ControllerState,
        to: ControllerState,
    },
    CommandSourceChanged {
        from: CommandSource,
        to: CommandSource,
    },
    DataIntegrityDegraded {
        degraded: bool,
        consecutive: u32,
    },
    /// 命令的最终结果；同步拒绝为 `Err`
    CommandOutcome {
        command: Command,
        counter: Option<u32>,
        outcome: Result<CommandOutcome, CommandError>,
    },
}

pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
    dropped: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, capacity: usize) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// 发布事件；已关闭的订阅者被移除
    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            },
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// 因订阅队列已满而丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn degraded(consecutive: u32) -> SessionEvent {
        SessionEvent::DataIntegrityDegraded {
            degraded: true,
            consecutive,
        }
    }

    #[test]
    fn test_every_subscriber_receives_events() {
        let bus = EventBus::new();
        let a = bus.subscribe(4);
        let b = bus.subscribe(4);

        bus.publish(degraded(4));

        assert_eq!(a.try_recv().unwrap(), degraded(4));
        assert_eq!(b.try_recv().unwrap(), degraded(4));
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let bus = EventBus::new();
        let rx = bus.subscribe(2);

        for i in 0..5 {
            bus.publish(degraded(i));
        }

        assert_eq!(bus.dropped(), 3);
        assert_eq!(rx.try_recv().unwrap(), degraded(0));
        assert_eq!(rx.try_recv().unwrap(), degraded(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscribers_are_removed() {
        let bus = EventBus::new();
        let rx = bus.subscribe(2);
        let _keep = bus.subscribe(2);
        drop(rx);

        bus.publish(degraded(1));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.dropped(), 0);
    }
}
