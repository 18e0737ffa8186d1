//! 会话
//!
//! [`Session`] 组合连接管理器、状态跟踪器、命令源仲裁器和命令调度器。
//! IO 线程通过 [`SessionCallback`] 把解码结果交给 `SessionCore`，
//! 后者更新状态快照并向事件总线发布事件。

use crate::arbiter::CommandSourceArbiter;
use crate::dispatcher::{CommandDispatcher, CommandTicket, DispatchView, Resolution};
use crate::error::{CommandError, CommandOutcome};
use crate::events::{DEFAULT_SUBSCRIBER_CAPACITY, EventBus, SessionEvent};
use crate::state::ControllerStateTracker;
use crate::status::SessionStatus;
use arc_swap::ArcSwap;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rotator_driver::{
    ConnectionConfig, ConnectionManager, ConnectionState, DriverEvent, MetricsSnapshot, SessionCallback, SessionError,
    TelemetrySample,
};
use rotator_protocol::{Acknowledgment, Command, CommandSource, ControllerConfig, ControllerState};
use rotator_sim::{MockConfig, MockController};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 轮询等待时的休眠间隔
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// IO 线程侧的会话状态
struct SessionCore {
    status: ArcSwap<SessionStatus>,
    tracker: Mutex<ControllerStateTracker>,
    arbiter: CommandSourceArbiter,
    dispatcher: CommandDispatcher,
    bus: EventBus,
}

impl SessionCore {
    fn new(command_timeout: Duration) -> Self {
        Self {
            status: ArcSwap::from_pointee(SessionStatus::default()),
            tracker: Mutex::new(ControllerStateTracker::new()),
            arbiter: CommandSourceArbiter::new(),
            dispatcher: CommandDispatcher::new(command_timeout),
            bus: EventBus::new(),
        }
    }

    fn update(&self, f: impl Fn(&mut SessionStatus)) {
        self.status.rcu(|current| {
            let mut next = SessionStatus::clone(current);
            f(&mut next);
            next
        });
    }

    fn publish_resolution(&self, resolution: Resolution) {
        self.bus.publish(SessionEvent::CommandOutcome {
            command: resolution.command,
            counter: Some(resolution.counter),
            outcome: Ok(resolution.outcome),
        });
    }

    fn on_connection_state(&self, from: ConnectionState, to: ConnectionState) {
        if to == ConnectionState::Connecting {
            self.tracker.lock().reset();
            self.arbiter.reset();
            self.update(|status| {
                *status = SessionStatus {
                    connection: to,
                    ..SessionStatus::default()
                };
            });
        } else {
            self.update(|status| status.connection = to);
        }

        self.bus.publish(SessionEvent::ConnectionStateChanged { from, to });

        if matches!(to, ConnectionState::Lost | ConnectionState::Disconnected) {
            if let Some(resolution) = self.dispatcher.fail_pending() {
                self.publish_resolution(resolution);
            }
        }
    }

    fn on_telemetry(&self, sample: &TelemetrySample) {
        let telemetry = &sample.telemetry;

        let source_change = self.arbiter.observe(telemetry);
        if let Some((from, to)) = source_change {
            info!("Update system status: command source {} -> {}", from, to);
        }

        let update = self.tracker.lock().observe(telemetry.state, sample.faults);
        let transition = update.transition;

        self.update(|status| {
            status.telemetry = Some(*sample);
            status.controller_state = Some(transition.state);
            status.active_faults = update.faults;
            status.command_source = self.arbiter.current();
        });

        if let Some((from, to)) = source_change {
            self.bus.publish(SessionEvent::CommandSourceChanged { from, to });
        }

        if let Some(anomaly) = transition.anomaly {
            warn!("Unexpected controller transition: {} -> {}", anomaly.from, anomaly.to);
            self.bus.publish(SessionEvent::UnexpectedTransition {
                from: anomaly.from,
                to: anomaly.to,
            });
        }

        if transition.changed {
            match update.previous {
                Some(previous) => info!("Update system status: controller state {} -> {}", previous, transition.state),
                None => info!("Update system status: controller state {}", transition.state),
            }
            if transition.state.is_fault() && !update.faults.is_empty() {
                let kinds: Vec<String> = update.faults.iter().map(|kind| kind.to_string()).collect();
                warn!("Controller faults: {}", kinds.join(", "));
            }
            self.bus.publish(SessionEvent::ControllerStateChanged {
                from: update.previous,
                to: transition.state,
                faults: update.faults,
            });
        }

        if let Some(resolution) = self.dispatcher.on_telemetry(telemetry) {
            self.publish_resolution(resolution);
        }

        self.bus.publish(SessionEvent::TelemetryUpdated(*sample));
    }

    fn on_configuration(&self, config: &ControllerConfig) {
        info!("Update system status: configuration received");
        let config = *config;
        self.update(|status| status.config = Some(config));
        self.bus.publish(SessionEvent::ConfigurationUpdated(config));
    }

    fn on_ack(&self, ack: &Acknowledgment) {
        let handling = self.dispatcher.on_ack(ack);
        if handling.accepted == Some(Command::ClearError) {
            self.tracker.lock().note_clear_error_accepted();
        }
        if let Some(resolution) = handling.resolution {
            self.publish_resolution(resolution);
        }
    }
}

impl SessionCallback for SessionCore {
    fn on_event(&self, event: &DriverEvent) {
        match event {
            DriverEvent::ConnectionStateChanged { from, to } => self.on_connection_state(*from, *to),
            DriverEvent::Telemetry(sample) => self.on_telemetry(sample),
            DriverEvent::Configuration(config) => self.on_configuration(config),
            DriverEvent::Acknowledgment(ack) => self.on_ack(ack),
            DriverEvent::DataIntegrityDegraded { degraded, consecutive } => {
                let degraded = *degraded;
                self.update(|status| status.data_integrity_degraded = degraded);
                self.bus.publish(SessionEvent::DataIntegrityDegraded {
                    degraded,
                    consecutive: *consecutive,
                });
            },
        }
    }

    fn on_tick(&self, now: Instant) {
        if let Some(resolution) = self.dispatcher.on_tick(now) {
            self.publish_resolution(resolution);
        }
    }
}

/// 控制器会话
///
/// 通过 [`SessionBuilder`](crate::SessionBuilder) 创建。
/// 状态读取无锁（快照），命令提交同一时间只允许一个未决命令。
pub struct Session {
    core: Arc<SessionCore>,
    manager: ConnectionManager,
    config: ConnectionConfig,
    simulation_mode: bool,
    simulator: Mutex<Option<MockController>>,
}

impl Session {
    pub(crate) fn new(config: ConnectionConfig, simulation_mode: bool) -> Self {
        let core = Arc::new(SessionCore::new(config.command_timeout));
        let manager = ConnectionManager::new();
        manager.add_callback(core.clone());

        Self {
            core,
            manager,
            config,
            simulation_mode,
            simulator: Mutex::new(None),
        }
    }

    /// 连接控制器
    ///
    /// 仿真模式下先启动内部模拟控制器再连接。已连接时先断开。
    pub fn connect(&self) -> Result<(), SessionError> {
        if !self.simulation_mode {
            return self.manager.connect(&self.config);
        }

        let mut simulator = self.simulator.lock();
        if simulator.is_none() {
            let mock = MockController::start(MockConfig {
                telemetry_period: self.config.telemetry_period,
                ..Default::default()
            })?;
            info!("Simulation mode: mock controller listening on port {}", mock.port());
            *simulator = Some(mock);
        }
        let port = simulator.as_ref().map_or(self.config.port, MockController::port);
        drop(simulator);

        let config = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..self.config.clone()
        };
        let result = self.manager.connect(&config);
        if result.is_err() {
            if let Some(mock) = self.simulator.lock().take() {
                warn!("Simulation mode: stopping mock controller after failed connect");
                mock.stop();
            }
        }
        result
    }

    /// 断开连接；未连接时为空操作。仿真模式下同时停止模拟控制器。
    pub fn disconnect(&self) {
        self.manager.disconnect();
        if let Some(mock) = self.simulator.lock().take() {
            mock.stop();
        }
    }

    /// 提交命令
    ///
    /// 同步拒绝（未连接、忙、状态不允许、无命令权、参数越界）直接返回错误，
    /// 并同样以 `CommandOutcome` 事件发布。
    pub fn submit(&self, command: Command) -> Result<CommandTicket, CommandError> {
        let snapshot = self.core.status.load();
        let view = DispatchView {
            connection: self.manager.state(),
            state: snapshot.controller_state,
            config: snapshot.config.as_ref(),
            arbiter: &self.core.arbiter,
        };

        let result = self
            .core
            .dispatcher
            .submit(command, &view, |frame| self.manager.send(frame));

        if let Err(err) = &result {
            warn!("Command {} rejected: {}", command, err);
            self.core.bus.publish(SessionEvent::CommandOutcome {
                command,
                counter: None,
                outcome: Err(err.clone()),
            });
        }
        result
    }

    /// 提交并阻塞等待结果
    pub fn execute(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        Ok(self.submit(command)?.wait())
    }

    /// 请求切换命令源
    pub fn request_switch(&self, to: CommandSource) -> Result<CommandTicket, CommandError> {
        self.submit(Command::SwitchCommandSource { to })
    }

    /// 断开前是否需要提醒操作员（仍连接且命令权在本地）
    pub fn should_warn_before_disconnect(&self) -> bool {
        self.core.arbiter.should_warn_before_disconnect(self.manager.state())
    }

    /// 当前状态快照（包含未决命令和连接指标）
    pub fn status(&self) -> SessionStatus {
        let mut status = SessionStatus::clone(&self.core.status.load());
        status.connection = self.manager.state();
        status.pending = self.core.dispatcher.pending();
        status.metrics = self.manager.metrics();
        status
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.core.bus.subscribe(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<SessionEvent> {
        self.core.bus.subscribe(capacity)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn controller_state(&self) -> Option<ControllerState> {
        self.core.status.load().controller_state
    }

    pub fn command_source(&self) -> CommandSource {
        self.core.arbiter.current()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.manager.metrics()
    }

    /// 因订阅队列已满而丢弃的事件数
    pub fn dropped_events(&self) -> u64 {
        self.core.bus.dropped()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_simulation_mode(&self) -> bool {
        self.simulation_mode
    }

    /// 仿真模式下模拟控制器的端口
    pub fn simulator_port(&self) -> Option<u16> {
        self.simulator.lock().as_ref().map(MockController::port)
    }

    /// 等待第一帧遥测
    pub fn wait_for_telemetry(&self, timeout: Duration) -> Result<SessionStatus, SessionError> {
        let start = Instant::now();
        loop {
            let status = self.status();
            if status.telemetry.is_some() {
                return Ok(status);
            }
            match status.connection {
                ConnectionState::Lost => return Err(SessionError::ConnectionLost),
                ConnectionState::Disconnected => return Err(SessionError::NotConnected),
                ConnectionState::Connecting | ConnectionState::Connected => {},
            }
            if start.elapsed() >= timeout {
                return Err(SessionError::ConnectTimeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// 轮询直到 `predicate` 成立或超时
    pub fn wait_until(&self, timeout: Duration, predicate: impl Fn(&SessionStatus) -> bool) -> Option<SessionStatus> {
        let start = Instant::now();
        loop {
            let status = self.status();
            if predicate(&status) {
                return Some(status);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotator_driver::{RateSnapshot, TelemetrySample};
    use rotator_protocol::{
        CommandStatus, EnabledSubstate, FaultKind, FaultSet, FaultSubstate, Telemetry,
    };

    fn sample(state: ControllerState, faults: FaultSet) -> TelemetrySample {
        TelemetrySample {
            telemetry: Telemetry {
                state,
                ..Default::default()
            },
            counter: 0,
            tai: 0.0,
            interval: None,
            tai_interval: None,
            stale: false,
            faults,
            rate: RateSnapshot::default(),
        }
    }

    fn drain(rx: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_fault_entry_publishes_state_change_with_faults() {
        let core = SessionCore::new(Duration::from_secs(5));
        let rx = core.bus.subscribe(64);
        let mut faults = FaultSet::empty();
        faults.insert(FaultKind::FollowingError);

        core.on_event(&DriverEvent::Telemetry(sample(
            ControllerState::Enabled(EnabledSubstate::Stationary),
            FaultSet::empty(),
        )));
        core.on_event(&DriverEvent::Telemetry(sample(
            ControllerState::Fault(FaultSubstate::EmergencyStopping),
            faults,
        )));

        let events = drain(&rx);
        assert!(events.contains(&SessionEvent::ControllerStateChanged {
            from: Some(ControllerState::Enabled(EnabledSubstate::Stationary)),
            to: ControllerState::Fault(FaultSubstate::EmergencyStopping),
            faults,
        }));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SessionEvent::UnexpectedTransition { .. }))
        );
        assert_eq!(core.status.load().active_faults, faults);
    }

    #[test]
    fn test_unexpected_transition_published_once() {
        let core = SessionCore::new(Duration::from_secs(5));
        let rx = core.bus.subscribe(64);

        core.on_event(&DriverEvent::Telemetry(sample(ControllerState::Standby, FaultSet::empty())));
        core.on_event(&DriverEvent::Telemetry(sample(
            ControllerState::Enabled(EnabledSubstate::MovingPt2Pt),
            FaultSet::empty(),
        )));
        core.on_event(&DriverEvent::Telemetry(sample(
            ControllerState::Enabled(EnabledSubstate::MovingPt2Pt),
            FaultSet::empty(),
        )));

        let anomalies = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::UnexpectedTransition { .. }))
            .count();
        assert_eq!(anomalies, 1);
        assert_eq!(
            core.status.load().controller_state,
            Some(ControllerState::Enabled(EnabledSubstate::MovingPt2Pt))
        );
    }

    #[test]
    fn test_connection_loss_fails_pending_command() {
        let core = SessionCore::new(Duration::from_secs(5));
        let rx = core.bus.subscribe(64);
        let view = DispatchView {
            connection: ConnectionState::Connected,
            state: Some(ControllerState::Standby),
            config: None,
            arbiter: &core.arbiter,
        };
        let ticket = core.dispatcher.submit(Command::Enable, &view, |_| Ok(())).unwrap();

        core.on_event(&DriverEvent::ConnectionStateChanged {
            from: ConnectionState::Connected,
            to: ConnectionState::Lost,
        });

        assert_eq!(
            ticket.wait(),
            CommandOutcome::Failed(crate::error::FailureReason::ConnectionLost)
        );
        let events = drain(&rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::CommandOutcome {
                command: Command::Enable,
                outcome: Ok(CommandOutcome::Failed(_)),
                ..
            }
        )));
    }

    #[test]
    fn test_clear_error_acceptance_makes_standby_legal() {
        let core = SessionCore::new(Duration::from_secs(5));
        let rx = core.bus.subscribe(64);
        let waiting = ControllerState::Fault(FaultSubstate::WaitClearError);
        core.on_event(&DriverEvent::Telemetry(sample(waiting, FaultSet::empty())));

        let view = DispatchView {
            connection: ConnectionState::Connected,
            state: Some(waiting),
            config: None,
            arbiter: &core.arbiter,
        };
        let ticket = core.dispatcher.submit(Command::ClearError, &view, |_| Ok(())).unwrap();
        core.on_event(&DriverEvent::Acknowledgment(Acknowledgment {
            counter: ticket.counter(),
            status: CommandStatus::Ack,
            duration: 0.0,
            reason: String::new(),
        }));
        core.on_event(&DriverEvent::Telemetry(sample(ControllerState::Standby, FaultSet::empty())));

        assert_eq!(ticket.wait(), CommandOutcome::Succeeded);
        assert!(
            !drain(&rx)
                .iter()
                .any(|e| matches!(e, SessionEvent::UnexpectedTransition { .. }))
        );
    }

    #[test]
    fn test_submit_without_connection_publishes_rejection() {
        let session = Session::new(ConnectionConfig::default(), false);
        let rx = session.subscribe();

        assert_eq!(session.submit(Command::Stop).unwrap_err(), CommandError::NotConnected);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::CommandOutcome {
                command: Command::Stop,
                counter: None,
                outcome: Err(CommandError::NotConnected),
            }
        );
        assert!(!session.should_warn_before_disconnect());
    }

    #[test]
    fn test_connecting_resets_derived_state() {
        let core = SessionCore::new(Duration::from_secs(5));
        core.on_event(&DriverEvent::Telemetry(sample(ControllerState::Standby, FaultSet::empty())));
        core.on_event(&DriverEvent::ConnectionStateChanged {
            from: ConnectionState::Lost,
            to: ConnectionState::Connecting,
        });

        let status = core.status.load();
        assert_eq!(status.connection, ConnectionState::Connecting);
        assert!(status.telemetry.is_none());
        assert!(status.controller_state.is_none());
        assert!(core.tracker.lock().current().is_none());
    }
}
