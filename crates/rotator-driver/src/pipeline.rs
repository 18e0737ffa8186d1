//! IO 循环
//!
//! 单个 IO 线程独占套接字：读取字节、切分帧、解码并发布事件，
//! 同时在每次读取前后发送命令队列中的待发帧（双重 Drain）。

use crate::config::ConnectionConfig;
use crate::context::SessionContext;
use crate::decoder::TelemetryDecoder;
use crate::event::ConnectionState;
use crate::watchdog::StallWatchdog;
use bytes::Bytes;
use crossbeam_channel::{Receiver, TryRecvError};
use rotator_protocol::FrameReader;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

/// 单次读取缓冲区大小
const READ_CHUNK: usize = 4096;

/// IO 线程循环
///
/// # 参数
/// - `stream`: 已设置读超时的套接字（读超时决定轮询间隔）
/// - `cmd_rx`: 已编码命令帧的接收通道
/// - `ctx`: 共享上下文
/// - `config`: 连接配置
/// - `is_running`: 运行标志，`disconnect` 时置为 false
///
/// 以下情况退出：命令通道断开、运行标志清除、对端关闭、套接字错误、流停滞。
/// 后三种情况会把连接状态从 `Connected` 切换为 `Lost`。
pub fn io_loop(
    mut stream: impl Read + Write,
    cmd_rx: Receiver<Bytes>,
    ctx: Arc<SessionContext>,
    config: ConnectionConfig,
    is_running: Arc<AtomicBool>,
) {
    let mut reader = FrameReader::new();
    let mut decoder = TelemetryDecoder::new(&config);
    let watchdog = StallWatchdog::new(config.stall_timeout());
    let mut buf = [0u8; READ_CHUNK];

    loop {
        if !is_running.load(Ordering::Acquire) {
            break;
        }

        if drain_tx_queue(&mut stream, &cmd_rx, &ctx) {
            break;
        }

        match stream.read(&mut buf) {
            Ok(0) => {
                mark_lost(&ctx, &is_running, "controller closed the connection");
                break;
            },
            Ok(n) => {
                ctx.metrics.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                reader.push(&buf[..n]);

                while let Some(decoded) = reader.next_frame() {
                    watchdog.register_frame();
                    ctx.metrics.frames_received.fetch_add(1, Ordering::Relaxed);
                    if decoded.is_malformed() {
                        ctx.metrics.malformed_frames.fetch_add(1, Ordering::Relaxed);
                    }

                    for event in decoder.process(decoded, Instant::now()) {
                        ctx.publish(&event);
                    }
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                ctx.metrics.read_timeouts.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => {
                error!("Socket read error: {}", e);
                mark_lost(&ctx, &is_running, "socket error");
                break;
            },
        }

        if !watchdog.check() {
            warn!(
                "No frame received for {:?} (limit {:?})",
                watchdog.time_since_last_frame(),
                watchdog.timeout()
            );
            mark_lost(&ctx, &is_running, "telemetry stream stalled");
            break;
        }

        ctx.tick(Instant::now());

        if drain_tx_queue(&mut stream, &cmd_rx, &ctx) {
            break;
        }
    }

    trace!("IO loop exited");
}

fn mark_lost(ctx: &SessionContext, is_running: &AtomicBool, reason: &str) {
    // disconnect 进行中时由调用方负责切换到 Disconnected
    if !is_running.load(Ordering::Acquire) {
        return;
    }
    warn!("Connection lost: {}", reason);
    ctx.transition_from(ConnectionState::Connected, ConnectionState::Lost);
}

/// Drain 命令队列（带时间预算）
///
/// 单次最多发送 32 帧、最多占用 1ms，避免积压命令拖慢接收。
/// 返回是否检测到通道已断开。
fn drain_tx_queue(stream: &mut impl Write, cmd_rx: &Receiver<Bytes>, ctx: &SessionContext) -> bool {
    const MAX_DRAIN_PER_CYCLE: usize = 32;
    const TIME_BUDGET: Duration = Duration::from_millis(1);

    let start = Instant::now();

    for _ in 0..MAX_DRAIN_PER_CYCLE {
        if start.elapsed() > TIME_BUDGET {
            trace!("Drain time budget exhausted, deferred {} frames", cmd_rx.len());
            break;
        }

        match cmd_rx.try_recv() {
            Ok(frame) => match stream.write_all(&frame).and_then(|_| stream.flush()) {
                Ok(()) => {
                    ctx.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => {
                    // 连接真正断开时读路径会检测到 EOF / 错误
                    error!("Failed to send command frame: {}", e);
                    ctx.metrics.send_errors.fetch_add(1, Ordering::Relaxed);
                },
            },
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => return true,
        }
    }

    false
}
