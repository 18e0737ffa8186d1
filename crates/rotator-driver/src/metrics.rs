//! IO 链路指标
//!
//! 原子计数器，IO 线程写入，任意线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 会话 IO 指标
///
/// # 使用示例
///
/// ```rust
/// use rotator_driver::SessionMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = SessionMetrics::new();
/// metrics.frames_received.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().frames_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// 完整帧数（包括损坏帧）
    pub frames_received: AtomicU64,
    /// 从套接字读到的字节数
    pub bytes_received: AtomicU64,
    /// 损坏帧数
    pub malformed_frames: AtomicU64,
    /// 已写入套接字的命令数
    pub commands_sent: AtomicU64,
    /// 命令写入失败次数
    pub send_errors: AtomicU64,
    /// 读超时次数（正常现象，两帧之间会超时）
    pub read_timeouts: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器（每次新连接时调用）
    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.malformed_frames.store(0, Ordering::Relaxed);
        self.commands_sent.store(0, Ordering::Relaxed);
        self.send_errors.store(0, Ordering::Relaxed);
        self.read_timeouts.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub malformed_frames: u64,
    pub commands_sent: u64,
    pub send_errors: u64,
    pub read_timeouts: u64,
}

impl MetricsSnapshot {
    /// 损坏帧比例（百分比）；没有收到帧时返回 0.0
    pub fn malformed_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        (self.malformed_frames as f64 / self.frames_received as f64) * 100.0
    }
}
