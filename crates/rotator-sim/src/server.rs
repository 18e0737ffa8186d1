//! 模拟控制器 TCP 服务
//!
//! 监听 `127.0.0.1` 上的端口，同一时间服务一个客户端：
//! 连接建立时发送配置帧，之后每个周期处理收到的命令、推进模型并发送遥测。

use crate::model::SimulatedController;
use bytes::BytesMut;
use parking_lot::Mutex;
use rand::Rng;
use rotator_protocol::codec::{encode_ack, encode_configuration, encode_telemetry};
use rotator_protocol::{
    Acknowledgment, Command, CommandSource, ControllerState, Decoded, FrameHeader, FrameId, FrameReader,
};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// TAI 与 UTC 的差（s）
const TAI_OFFSET: f64 = 37.0;

/// 等待新客户端时的轮询间隔
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 读取命令时的超时（决定每周期读取的最长阻塞）
const READ_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockConfig {
    /// 遥测周期（默认 50ms）
    pub telemetry_period: Duration,
    pub initial_state: ControllerState,
    /// 初始位置（deg）
    pub initial_position: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            telemetry_period: Duration::from_millis(50),
            initial_state: ControllerState::Standby,
            initial_position: 0.0,
        }
    }
}

/// 测试注入与观测用的共享状态
struct Shared {
    model: SimulatedController,
    telemetry_paused: bool,
    silent: bool,
    garbage_frames: u32,
    received: Vec<Command>,
    drop_client: bool,
}

/// 模拟控制器
pub struct MockController {
    addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockController {
    /// 在临时端口上启动
    pub fn start(config: MockConfig) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let shared = Arc::new(Mutex::new(Shared {
            model: SimulatedController::new(config.initial_state, config.initial_position),
            telemetry_paused: false,
            silent: false,
            garbage_frames: 0,
            received: Vec::new(),
            drop_client: false,
        }));
        let is_running = Arc::new(AtomicBool::new(true));

        let thread = {
            let shared = shared.clone();
            let is_running = is_running.clone();
            let period = config.telemetry_period;
            thread::Builder::new()
                .name("rotator-mock".into())
                .spawn(move || accept_loop(listener, shared, is_running, period))?
        };

        info!("Mock controller listening on {}", addr);
        Ok(Self {
            addr,
            shared,
            is_running,
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// 注入跟随误差（下一周期进入 Fault）
    pub fn inject_following_error(&self) {
        self.shared.lock().model.inject_following_error();
    }

    pub fn clear_fault_condition(&self) {
        self.shared.lock().model.clear_fault_condition();
    }

    /// 模拟远端接管或交还命令权
    pub fn set_command_source(&self, source: CommandSource) {
        self.shared.lock().model.set_command_source(source);
    }

    /// 暂停遥测（连接保持，用于触发流停滞）
    pub fn set_telemetry_paused(&self, paused: bool) {
        self.shared.lock().telemetry_paused = paused;
    }

    /// 静默模式：记录命令但不执行、不应答
    pub fn set_silent(&self, silent: bool) {
        self.shared.lock().silent = silent;
    }

    /// 在下一周期的遥测之前连续发送 `count` 个随机内容的帧
    pub fn inject_garbage(&self, count: u32) {
        self.shared.lock().garbage_frames += count;
    }

    /// 主动断开当前客户端
    pub fn drop_client(&self) {
        self.shared.lock().drop_client = true;
    }

    pub fn state(&self) -> ControllerState {
        self.shared.lock().model.state()
    }

    /// 收到的全部命令（按到达顺序）
    pub fn received_commands(&self) -> Vec<Command> {
        self.shared.lock().received.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Mock controller thread panicked");
            }
        }
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Mutex<Shared>>, is_running: Arc<AtomicBool>, period: Duration) {
    while is_running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("Mock controller: client connected from {}", peer);
                match serve_client(stream, &shared, &is_running, period) {
                    Ok(()) => info!("Mock controller: client {} disconnected", peer),
                    Err(e) => debug!("Mock controller: client {} closed: {}", peer, e),
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) => {
                warn!("Mock controller accept failed: {}", e);
                thread::sleep(ACCEPT_POLL_INTERVAL);
            },
        }
    }
    trace!("Mock controller stopped");
}

fn serve_client(
    mut stream: TcpStream,
    shared: &Mutex<Shared>,
    is_running: &AtomicBool,
    period: Duration,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut reader = FrameReader::new();
    let mut buf = [0u8; 1024];
    let mut telemetry_counter: u32 = 0;
    let mut next_tick = Instant::now();

    let config = {
        let mut shared = shared.lock();
        shared.drop_client = false;
        shared.model.take_config_changed();
        shared.model.config()
    };
    let header = FrameHeader::new(FrameId::Configuration, 0).with_tai(current_tai());
    stream.write_all(&encode_configuration(&header, &config))?;

    while is_running.load(Ordering::Acquire) {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => reader.push(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {},
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        let mut out = BytesMut::new();
        {
            let mut shared = shared.lock();
            if shared.drop_client {
                info!("Mock controller: dropping client");
                return Ok(());
            }

            while let Some(decoded) = reader.next_frame() {
                handle_frame(&mut shared, decoded, &mut out);
            }

            if now >= next_tick {
                shared.model.step();
                if shared.model.take_config_changed() {
                    let header = FrameHeader::new(FrameId::Configuration, 0).with_tai(current_tai());
                    out.extend_from_slice(&encode_configuration(&header, &shared.model.config()));
                }
                for _ in 0..std::mem::take(&mut shared.garbage_frames) {
                    out.extend_from_slice(&garbage_frame());
                }
                if !shared.telemetry_paused {
                    telemetry_counter = telemetry_counter.wrapping_add(1);
                    let header = FrameHeader::new(FrameId::Telemetry, telemetry_counter).with_tai(current_tai());
                    out.extend_from_slice(&encode_telemetry(&header, &shared.model.telemetry()));
                }

                next_tick += period;
                if next_tick < now {
                    next_tick = now + period;
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out)?;
        }

        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep((next_tick - now).min(READ_TIMEOUT));
        }
    }

    Ok(())
}

fn handle_frame(shared: &mut Shared, decoded: Decoded, out: &mut BytesMut) {
    let (header, wire) = match decoded {
        Decoded::Command { header, command } => (header, command),
        other => {
            warn!("Mock controller: unexpected frame from client: {:?}", other.header());
            return;
        },
    };

    let ack = match Command::from_wire(&wire) {
        Ok(command) => {
            debug!("Mock controller: received {} (counter {})", command, header.counter);
            shared.received.push(command);
            if shared.silent {
                return;
            }
            match shared.model.handle(&command) {
                Ok(()) => Acknowledgment::ack(header.counter, 0.0),
                Err(reason) => {
                    debug!("Mock controller: rejected {}: {}", command, reason);
                    Acknowledgment::no_ack(header.counter, reason)
                },
            }
        },
        Err(e) => Acknowledgment::no_ack(header.counter, e.to_string()),
    };

    let ack_header = FrameHeader::new(FrameId::CommandAck, header.counter).with_tai(current_tai());
    out.extend_from_slice(&encode_ack(&ack_header, &ack));
}

/// 长度前缀合法、帧体随机的帧
fn garbage_frame() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let len: usize = rng.gen_range(18..64);
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes());
    // 帧类型 0xEE 不存在，确保解码失败
    frame.push(0xEE);
    frame.extend((1..len).map(|_| rng.r#gen::<u8>()));
    frame
}

fn current_tai() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() + TAI_OFFSET)
        .unwrap_or(0.0)
}
