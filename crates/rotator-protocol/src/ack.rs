//! 命令应答帧（控制器 → 客户端）

use crate::ProtocolError;
use crate::frame::{HEADER_LEN, MAX_BODY_LEN};
use bytes::{Buf, BufMut};
use num_enum::TryFromPrimitive;

/// 应答负载的固定部分：counter(4) + status(1) + duration(8) + reason_len(2)
pub const ACK_FIXED_LEN: usize = 15;

/// 拒绝原因的最大字节数（整帧不超过 [`MAX_BODY_LEN`]）
pub const MAX_REASON_LEN: usize = MAX_BODY_LEN - HEADER_LEN - ACK_FIXED_LEN;

/// 应答状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CommandStatus {
    /// 已接受，正在执行
    Ack = 1,
    /// 拒绝
    NoAck = 2,
    /// 执行完成
    Done = 3,
}

/// 命令应答
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Acknowledgment {
    /// 对应命令的序号
    pub counter: u32,
    pub status: CommandStatus,
    /// 控制器预计执行时长（s）
    pub duration: f64,
    /// 拒绝原因（Ack/Done 时一般为空）
    pub reason: String,
}

impl Acknowledgment {
    pub fn ack(counter: u32, duration: f64) -> Self {
        Self {
            counter,
            status: CommandStatus::Ack,
            duration,
            reason: String::new(),
        }
    }

    pub fn no_ack(counter: u32, reason: impl Into<String>) -> Self {
        Self {
            counter,
            status: CommandStatus::NoAck,
            duration: 0.0,
            reason: reason.into(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == CommandStatus::NoAck
    }

    /// 编码负载；过长的原因在字符边界处截断到 [`MAX_REASON_LEN`]
    pub fn encode_payload(&self, buf: &mut impl BufMut) {
        let reason = truncate_reason(&self.reason);
        buf.put_u32_le(self.counter);
        buf.put_u8(self.status as u8);
        buf.put_f64_le(self.duration);
        buf.put_u16_le(reason.len() as u16);
        buf.put_slice(reason.as_bytes());
    }

    pub fn decode_payload(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < ACK_FIXED_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: ACK_FIXED_LEN,
                actual: buf.len(),
            });
        }

        let counter = buf.get_u32_le();
        let raw_status = buf.get_u8();
        let status = CommandStatus::try_from(raw_status).map_err(|_| ProtocolError::InvalidValue {
            field: "status",
            value: raw_status as f64,
        })?;
        let duration = buf.get_f64_le();
        let reason_len = buf.get_u16_le() as usize;
        if buf.remaining() != reason_len {
            return Err(ProtocolError::InvalidLength {
                expected: ACK_FIXED_LEN + reason_len,
                actual: ACK_FIXED_LEN + buf.remaining(),
            });
        }
        let reason = std::str::from_utf8(buf)
            .map_err(|e| ProtocolError::ParseError(format!("reason is not UTF-8: {}", e)))?
            .to_string();

        Ok(Self {
            counter,
            status,
            duration,
            reason,
        })
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_REASON_LEN {
        return reason;
    }
    let mut end = MAX_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}
