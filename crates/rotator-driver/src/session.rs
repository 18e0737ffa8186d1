//! 连接管理
//!
//! [`ConnectionManager`] 负责套接字生命周期：连接、断开、命令发送，
//! 以及把 IO 线程产生的事件交给已注册的回调。

use crate::config::ConnectionConfig;
use crate::context::SessionContext;
use crate::error::SessionError;
use crate::event::ConnectionState;
use crate::hooks::SessionCallback;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::io_loop;
use bytes::Bytes;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::mem::ManuallyDrop;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 命令队列容量
const COMMAND_QUEUE_CAPACITY: usize = 10;

/// 读超时，即 IO 循环的轮询间隔
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> Result<(), String>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<(), String> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 由辅助线程执行阻塞的 join；超时后辅助线程继续等待，进程退出时回收
        thread::spawn(move || {
            let _ = tx.send(self.join().is_ok());
        });

        match rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err("thread panicked".to_string()),
            Err(_) => Err(format!("thread did not exit within {:?}", timeout)),
        }
    }
}

/// 一次活动连接：IO 线程 + 命令通道
struct Connection {
    /// Drop 时必须先关闭通道再 join，否则 IO 线程收不到 Disconnected
    cmd_tx: ManuallyDrop<Sender<Bytes>>,
    io_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
}

impl Connection {
    fn open(config: &ConnectionConfig, ctx: &Arc<SessionContext>) -> Result<Self, SessionError> {
        let addr = resolve(config)?;
        let stream =
            TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(SessionError::from_connect_error)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

        // 在 IO 线程启动之前进入 Connected，IO 线程只会把它切换到 Lost
        ctx.transition(ConnectionState::Connected);

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_CAPACITY);
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx_clone = ctx.clone();
        let config_clone = config.clone();
        let is_running_clone = is_running.clone();
        let io_thread = thread::Builder::new()
            .name("rotator-io".to_string())
            .spawn(move || io_loop(stream, cmd_rx, ctx_clone, config_clone, is_running_clone))?;

        Ok(Self {
            cmd_tx: ManuallyDrop::new(cmd_tx),
            io_thread: Some(io_thread),
            is_running,
        })
    }

    fn send(&self, frame: Bytes) -> Result<(), SessionError> {
        self.cmd_tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::ChannelFull,
            TrySendError::Disconnected(_) => SessionError::ConnectionLost,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);

        // SAFETY: cmd_tx 只在这里 drop 一次，之后不再访问
        unsafe {
            ManuallyDrop::drop(&mut self.cmd_tx);
        }

        if let Some(handle) = self.io_thread.take()
            && let Err(e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!("IO thread failed to shut down: {}", e);
        }
    }
}

fn resolve(config: &ConnectionConfig) -> Result<SocketAddr, SessionError> {
    let address = config.address();
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|_| SessionError::AddressResolution(address.clone()))?
        .next()
        .ok_or(SessionError::AddressResolution(address))
}

/// 连接管理器
///
/// 同一时间最多一个活动连接；`connect` 会先断开已有连接。不会自动重连。
pub struct ConnectionManager {
    ctx: Arc<SessionContext>,
    connection: Mutex<Option<Connection>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            ctx: Arc::new(SessionContext::new()),
            connection: Mutex::new(None),
        }
    }

    /// 注册事件回调（在 `connect` 之前注册才能收到全部事件）
    pub fn add_callback(&self, callback: Arc<dyn SessionCallback>) {
        match self.ctx.hooks.write() {
            Ok(mut hooks) => hooks.add_callback(callback),
            Err(_) => error!("Hook manager lock poisoned, callback not registered"),
        }
    }

    /// 建立连接
    ///
    /// # 错误
    /// - `SessionError::ConnectTimeout`: 在 `connect_timeout` 内未完成握手
    /// - `SessionError::ConnectRefused`: 控制器拒绝连接
    /// - `SessionError::AddressResolution` / `SessionError::Io`: 其他失败
    pub fn connect(&self, config: &ConnectionConfig) -> Result<(), SessionError> {
        let previous = self.connection.lock().take();
        self.close(previous);

        self.ctx.metrics.reset();
        self.ctx.transition(ConnectionState::Connecting);
        info!("Connecting to controller at {}", config.address());

        match Connection::open(config, &self.ctx) {
            Ok(connection) => {
                info!("Connected to controller at {}", config.address());
                *self.connection.lock() = Some(connection);
                Ok(())
            },
            Err(e) => {
                warn!("Failed to connect to {}: {}", config.address(), e);
                self.ctx.transition(ConnectionState::Disconnected);
                Err(e)
            },
        }
    }

    /// 断开连接；已断开时为空操作
    pub fn disconnect(&self) {
        let connection = self.connection.lock().take();
        self.close(connection);
    }

    /// 须在连接锁之外调用
    fn close(&self, connection: Option<Connection>) {
        if let Some(connection) = connection {
            info!("Disconnecting from controller");
            drop(connection);
        }
        self.ctx.transition(ConnectionState::Disconnected);
    }

    /// 把已编码的命令帧放入发送队列（非阻塞）
    ///
    /// # 错误
    /// - `SessionError::NotConnected`: 当前不是 `Connected`
    /// - `SessionError::ChannelFull`: 发送队列已满
    /// - `SessionError::ConnectionLost`: IO 线程已退出
    pub fn send(&self, frame: Bytes) -> Result<(), SessionError> {
        if self.state() != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let slot = self.connection.lock();
        slot.as_ref().ok_or(SessionError::NotConnected)?.send(frame)
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 等待收到第一帧（用于初始化）
    pub fn wait_for_frames(&self, timeout: Duration) -> Result<(), SessionError> {
        let start = Instant::now();
        loop {
            if self.ctx.metrics.frames_received.load(Ordering::Relaxed) > 0 {
                return Ok(());
            }
            match self.state() {
                ConnectionState::Connected | ConnectionState::Connecting => {},
                ConnectionState::Lost => return Err(SessionError::ConnectionLost),
                ConnectionState::Disconnected => return Err(SessionError::NotConnected),
            }
            if start.elapsed() >= timeout {
                return Err(SessionError::ConnectTimeout);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            drop(connection);
        }
    }
}
