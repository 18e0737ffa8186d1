//! 帧头定义
//!
//! 每一帧在流上的布局：
//!
//! ```text
//! ┌──────────────┬────────────────────── body ───────────────────────┐
//! │ length: u32  │ header (18 bytes)               │ payload         │
//! └──────────────┴─────────────────────────────────┴─────────────────┘
//!
//! header := frame_id:u8 version:u8 counter:u32 tai_sec:u64 tai_nsec:u32
//! ```
//!
//! `length` 只统计 body（header + payload），不包含自身 4 字节。

use crate::ProtocolError;
use bytes::{Buf, BufMut};
use num_enum::TryFromPrimitive;

/// 当前协议版本
pub const PROTOCOL_VERSION: u8 = 1;

/// 长度前缀字节数
pub const LENGTH_PREFIX_LEN: usize = 4;

/// 帧头字节数
pub const HEADER_LEN: usize = 18;

/// 单帧 body 的最大长度（超出视为流已损坏）
pub const MAX_BODY_LEN: usize = 4096;

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FrameId {
    /// 控制器 → 客户端：周期遥测
    Telemetry = 0x01,
    /// 控制器 → 客户端：配置快照
    Configuration = 0x02,
    /// 控制器 → 客户端：命令应答
    CommandAck = 0x03,
    /// 客户端 → 控制器：命令
    Command = 0x04,
}

impl FrameId {
    /// 从 u8 转换（未知值返回 None）
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::try_from(value).ok()
    }
}

/// 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_id: FrameId,
    pub version: u8,
    /// 发送方计数器（命令帧为命令序号）
    pub counter: u32,
    /// TAI 秒
    pub tai_sec: u64,
    /// TAI 纳秒
    pub tai_nsec: u32,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId, counter: u32) -> Self {
        Self {
            frame_id,
            version: PROTOCOL_VERSION,
            counter,
            tai_sec: 0,
            tai_nsec: 0,
        }
    }

    /// 设置 TAI 时间戳（秒，浮点）
    pub fn with_tai(mut self, tai: f64) -> Self {
        let tai = tai.max(0.0);
        self.tai_sec = tai.trunc() as u64;
        self.tai_nsec = ((tai.fract() * 1e9).round() as u32).min(999_999_999);
        self
    }

    /// TAI 时间戳（秒）
    pub fn tai(&self) -> f64 {
        self.tai_sec as f64 + self.tai_nsec as f64 * 1e-9
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.frame_id as u8);
        buf.put_u8(self.version);
        buf.put_u32_le(self.counter);
        buf.put_u64_le(self.tai_sec);
        buf.put_u32_le(self.tai_nsec);
    }

    /// 解析帧头（`buf` 至少包含 `HEADER_LEN` 字节）
    pub fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let id = buf.get_u8();
        let frame_id = FrameId::from_u8(id).ok_or(ProtocolError::UnknownFrameId { id })?;
        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion { version });
        }

        let counter = buf.get_u32_le();
        let tai_sec = buf.get_u64_le();
        let tai_nsec = buf.get_u32_le();
        if tai_nsec >= 1_000_000_000 {
            return Err(ProtocolError::ParseError(format!(
                "tai_nsec out of range: {}",
                tai_nsec
            )));
        }

        Ok(Self {
            frame_id,
            version,
            counter,
            tai_sec,
            tai_nsec,
        })
    }
}
