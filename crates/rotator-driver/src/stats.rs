//! 遥测帧间隔统计（滚动窗口）

use std::collections::VecDeque;
use std::time::Duration;

/// 滚动窗口长度
pub const RATE_WINDOW: usize = 20;

/// 帧间隔滚动统计
#[derive(Debug, Clone, Default)]
pub struct RateStats {
    intervals: VecDeque<Duration>,
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateSnapshot {
    /// 平均帧间隔（s）
    pub mean_interval: f64,
    /// 帧率（Hz）
    pub frames_per_second: f64,
    /// 窗口内样本数
    pub samples: usize,
}

impl RateStats {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(RATE_WINDOW),
        }
    }

    pub fn push(&mut self, interval: Duration) {
        if self.intervals.len() == RATE_WINDOW {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
    }

    pub fn mean_interval(&self) -> Option<Duration> {
        if self.intervals.is_empty() {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        Some(total / self.intervals.len() as u32)
    }

    pub fn snapshot(&self) -> RateSnapshot {
        let mean = self.mean_interval().map(|d| d.as_secs_f64()).unwrap_or(0.0);
        RateSnapshot {
            mean_interval: mean,
            frames_per_second: if mean > 0.0 { 1.0 / mean } else { 0.0 },
            samples: self.intervals.len(),
        }
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}
