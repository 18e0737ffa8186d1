//! 会话层端到端测试
//!
//! 每个测试启动一个本地模拟控制器（20ms 遥测周期），通过真实 TCP 连接驱动会话。

use crossbeam_channel::Receiver;
use rotator_sdk::prelude::*;
use rotator_sdk::{MockConfig, MockController};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const PERIOD: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(3);

fn start_mock() -> MockController {
    MockController::start(MockConfig {
        telemetry_period: PERIOD,
        ..Default::default()
    })
    .expect("mock controller should start")
}

fn builder_for(mock: &MockController) -> SessionBuilder {
    SessionBuilder::new()
        .host("127.0.0.1")
        .port(mock.port())
        .connect_timeout(Duration::from_secs(1))
        .telemetry_period(PERIOD)
        .command_timeout(Duration::from_secs(2))
}

fn connect(builder: SessionBuilder) -> Session {
    let session = builder.build();
    session.connect().expect("connect should succeed");
    session.wait_for_telemetry(WAIT).expect("telemetry should arrive");
    session
}

fn wait_for_state(session: &Session, state: ControllerState) {
    assert!(
        session
            .wait_until(WAIT, |status| status.controller_state == Some(state))
            .is_some(),
        "timed out waiting for {}",
        state
    );
}

fn unexpected_transitions(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    events
        .try_iter()
        .filter(|event| matches!(event, SessionEvent::UnexpectedTransition { .. }))
        .collect()
}

#[test]
fn test_standby_rejects_move_then_enable_succeeds() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));

    assert_eq!(session.controller_state(), Some(ControllerState::Standby));
    assert!(session.status().config.is_some());

    let err = session.submit(Command::Move).unwrap_err();
    assert!(matches!(err, CommandError::InvalidForState { command: "Move", .. }));
    assert!(mock.received_commands().is_empty());

    assert_eq!(session.execute(Command::Enable).unwrap(), CommandOutcome::Succeeded);
    assert_eq!(
        session.controller_state(),
        Some(ControllerState::Enabled(EnabledSubstate::Stationary))
    );
    assert!(session.status().pending.is_none());
    assert!(session.should_warn_before_disconnect());
}

#[test]
fn test_point_to_point_move_completes() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));
    let events = session.subscribe();

    assert!(session.execute(Command::Enable).unwrap().is_success());
    assert!(session.execute(Command::PositionSet { position: 12.0 }).unwrap().is_success());
    assert!(session.execute(Command::Move).unwrap().is_success());

    let status = session
        .wait_until(WAIT, |status| {
            status.controller_state == Some(ControllerState::Enabled(EnabledSubstate::Stationary))
                && status.position().is_some_and(|pos| (pos - 12.0).abs() < 1e-6)
        })
        .expect("move should finish at 12 deg");
    assert_eq!(status.command_source, CommandSource::Gui);

    let moved = events.try_iter().any(|event| {
        matches!(
            event,
            SessionEvent::ControllerStateChanged {
                to: ControllerState::Enabled(EnabledSubstate::MovingPt2Pt),
                ..
            }
        )
    });
    assert!(moved);
    assert!(unexpected_transitions(&events).is_empty());

    assert_eq!(
        mock.received_commands(),
        vec![Command::Enable, Command::PositionSet { position: 12.0 }, Command::Move]
    );
}

#[test]
fn test_move_without_position_is_rejected_by_controller() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));

    session.execute(Command::Enable).unwrap();
    let outcome = session.execute(Command::Move).unwrap();
    assert_eq!(
        outcome,
        CommandOutcome::Failed(FailureReason::Rejected("Must set the position first.".to_string()))
    );
    assert!(!outcome.is_success());
}

#[test]
fn test_following_error_fault_and_clear_error() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));
    let events = session.subscribe();

    session.execute(Command::Enable).unwrap();
    mock.inject_following_error();

    wait_for_state(&session, ControllerState::Fault(FaultSubstate::WaitClearError));
    let status = session.status();
    assert!(status.active_faults.contains(FaultKind::FollowingError));

    // 故障条件仍在
    let outcome = session.execute(Command::ClearError).unwrap();
    assert!(matches!(outcome, CommandOutcome::Failed(FailureReason::Rejected(_))));
    assert!(session.controller_state().is_some_and(|state| state.is_fault()));

    mock.clear_fault_condition();
    assert_eq!(session.execute(Command::ClearError).unwrap(), CommandOutcome::Succeeded);
    assert_eq!(session.controller_state(), Some(ControllerState::Standby));
    assert!(session.status().active_faults.is_empty());

    let entered_fault = events.try_iter().any(|event| match event {
        SessionEvent::ControllerStateChanged {
            to: ControllerState::Fault(FaultSubstate::EmergencyStopping),
            faults,
            ..
        } => faults.contains(FaultKind::FollowingError),
        _ => false,
    });
    assert!(entered_fault);
    assert!(unexpected_transitions(&events).is_empty());
}

#[test]
fn test_stalled_stream_is_lost_and_fails_pending_command() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));
    let events = session.subscribe();

    mock.set_silent(true);
    let ticket = session.submit(Command::MaskLimitSwitch).unwrap();
    assert!(session.status().pending.is_some());

    mock.set_telemetry_paused(true);
    assert_eq!(ticket.wait(), CommandOutcome::Failed(FailureReason::ConnectionLost));
    assert_eq!(session.connection_state(), ConnectionState::Lost);
    assert!(session.status().pending.is_none());

    let lost = events.try_iter().any(|event| {
        matches!(
            event,
            SessionEvent::ConnectionStateChanged {
                to: ConnectionState::Lost,
                ..
            }
        )
    });
    assert!(lost);

    // 不自动重连
    thread::sleep(PERIOD * 5);
    assert_eq!(session.connection_state(), ConnectionState::Lost);
    assert!(matches!(session.submit(Command::Enable), Err(CommandError::NotConnected)));
}

#[test]
fn test_concurrent_submissions_send_one_command() {
    let mock = start_mock();
    let session = Arc::new(connect(builder_for(&mock)));
    mock.set_silent(true);

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                session.submit(Command::MaskLimitSwitch)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(CommandError::Busy { pending: "MaskLimitSwitch" })))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(busy, 7);

    thread::sleep(PERIOD * 3);
    assert_eq!(mock.received_commands(), vec![Command::MaskLimitSwitch]);
}

#[test]
fn test_unanswered_command_times_out_once() {
    let mock = start_mock();
    let session = connect(builder_for(&mock).command_timeout(Duration::from_millis(200)));
    let events = session.subscribe();

    mock.set_silent(true);
    let ticket = session.submit(Command::ConfigVelocity { limit: 2.0 }).unwrap();
    assert_eq!(ticket.wait(), CommandOutcome::TimedOut);
    assert!(session.status().pending.is_none());

    thread::sleep(Duration::from_millis(100));
    let timeouts = events
        .try_iter()
        .filter(|event| {
            matches!(
                event,
                SessionEvent::CommandOutcome {
                    outcome: Ok(CommandOutcome::TimedOut),
                    ..
                }
            )
        })
        .count();
    assert_eq!(timeouts, 1);

    mock.set_silent(false);
    assert_eq!(
        session.execute(Command::ConfigVelocity { limit: 2.0 }).unwrap(),
        CommandOutcome::Succeeded
    );
}

#[test]
fn test_remote_commander_blocks_commands_until_switch() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));
    let events = session.subscribe();

    mock.set_command_source(CommandSource::Csc);
    assert!(
        session
            .wait_until(WAIT, |status| status.command_source == CommandSource::Csc)
            .is_some()
    );
    assert!(!session.should_warn_before_disconnect());

    let err = session.submit(Command::Enable).unwrap_err();
    assert_eq!(err, CommandError::NotAuthorized { command: "Enable" });
    assert!(mock.received_commands().is_empty());

    let ticket = session.request_switch(CommandSource::Gui).unwrap();
    assert_eq!(ticket.wait(), CommandOutcome::Succeeded);
    assert_eq!(session.command_source(), CommandSource::Gui);
    assert!(session.execute(Command::Enable).unwrap().is_success());

    let changes: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            SessionEvent::CommandSourceChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![(CommandSource::Gui, CommandSource::Csc), (CommandSource::Csc, CommandSource::Gui)]
    );
}

#[test]
fn test_garbage_burst_degrades_then_recovers() {
    let mock = start_mock();
    let session = connect(builder_for(&mock));
    let events = session.subscribe();

    mock.inject_garbage(6);
    assert!(
        session
            .wait_until(WAIT, |status| status.metrics.malformed_frames >= 6)
            .is_some()
    );
    thread::sleep(PERIOD * 3);

    let flags: Vec<bool> = events
        .try_iter()
        .filter_map(|event| match event {
            SessionEvent::DataIntegrityDegraded { degraded, .. } => Some(degraded),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![true, false]);
    assert!(!session.status().data_integrity_degraded);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

#[test]
fn test_connect_refused() {
    // 取得一个空闲端口后立即释放
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let session = SessionBuilder::new()
        .host("127.0.0.1")
        .port(port)
        .connect_timeout(Duration::from_millis(500))
        .build();
    let events = session.subscribe();

    assert!(session.connect().is_err());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    let states: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            SessionEvent::ConnectionStateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![ConnectionState::Connecting, ConnectionState::Disconnected]);
}

#[test]
fn test_simulation_mode_session() {
    let session = SessionConfig {
        simulation_mode: true,
        ..Default::default()
    }
    .build_session();

    session.connect().unwrap();
    assert!(session.simulator_port().is_some());
    session.wait_for_telemetry(WAIT).unwrap();
    assert!(session.execute(Command::Enable).unwrap().is_success());

    session.disconnect();
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.simulator_port().is_none());
}
