//! 编解码入口与流式重组
//!
//! - `encode_*`：构造带长度前缀的完整帧
//! - [`decode`]：把一帧 body（不含长度前缀）解析为 [`Decoded`]，任何输入都不会 panic
//! - [`FrameReader`]：从 TCP 字节流中按长度前缀切分帧

use crate::ProtocolError;
use crate::ack::{ACK_FIXED_LEN, Acknowledgment, MAX_REASON_LEN};
use crate::command::{COMMAND_PAYLOAD_LEN, Command, WireCommand};
use crate::config::{CONFIG_PAYLOAD_LEN, ControllerConfig};
use crate::frame::{FrameHeader, FrameId, HEADER_LEN, LENGTH_PREFIX_LEN, MAX_BODY_LEN};
use crate::telemetry::{TELEMETRY_PAYLOAD_LEN, Telemetry};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// 解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Telemetry {
        header: FrameHeader,
        telemetry: Telemetry,
    },
    Configuration {
        header: FrameHeader,
        config: ControllerConfig,
    },
    Acknowledgment {
        header: FrameHeader,
        ack: Acknowledgment,
    },
    /// 命令帧（只有控制器端会收到）
    Command {
        header: FrameHeader,
        command: WireCommand,
    },
    /// 无法解析的帧，保留原始字节用于诊断
    Malformed { raw: Bytes, reason: ProtocolError },
}

impl Decoded {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Decoded::Malformed { .. })
    }

    pub fn header(&self) -> Option<&FrameHeader> {
        match self {
            Decoded::Telemetry { header, .. }
            | Decoded::Configuration { header, .. }
            | Decoded::Acknowledgment { header, .. }
            | Decoded::Command { header, .. } => Some(header),
            Decoded::Malformed { .. } => None,
        }
    }
}

fn encode_frame(header: &FrameHeader, payload_len: usize, payload: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + HEADER_LEN + payload_len);
    buf.put_u32_le(0);
    header.encode(&mut buf);
    payload(&mut buf);
    let body_len = (buf.len() - LENGTH_PREFIX_LEN) as u32;
    buf[..LENGTH_PREFIX_LEN].copy_from_slice(&body_len.to_le_bytes());
    buf.freeze()
}

/// 编码命令帧，`counter` 为命令序号
pub fn encode_command(command: &Command, counter: u32) -> Bytes {
    encode_wire_command(&command.to_wire(), counter)
}

pub fn encode_wire_command(command: &WireCommand, counter: u32) -> Bytes {
    let header = FrameHeader::new(FrameId::Command, counter);
    encode_frame(&header, COMMAND_PAYLOAD_LEN, |buf| command.encode_payload(buf))
}

pub fn encode_telemetry(header: &FrameHeader, telemetry: &Telemetry) -> Bytes {
    encode_frame(header, TELEMETRY_PAYLOAD_LEN, |buf| telemetry.encode_payload(buf))
}

pub fn encode_configuration(header: &FrameHeader, config: &ControllerConfig) -> Bytes {
    encode_frame(header, CONFIG_PAYLOAD_LEN, |buf| config.encode_payload(buf))
}

pub fn encode_ack(header: &FrameHeader, ack: &Acknowledgment) -> Bytes {
    encode_frame(header, ACK_FIXED_LEN + ack.reason.len().min(MAX_REASON_LEN), |buf| ack.encode_payload(buf))
}

/// 解析一帧 body（帧头 + 负载，不含长度前缀）
pub fn decode(body: &[u8]) -> Decoded {
    match try_decode(body) {
        Ok(decoded) => decoded,
        Err(reason) => Decoded::Malformed {
            raw: Bytes::copy_from_slice(body),
            reason,
        },
    }
}

fn try_decode(body: &[u8]) -> Result<Decoded, ProtocolError> {
    let header = FrameHeader::decode(body)?;
    let payload = &body[HEADER_LEN..];
    let decoded = match header.frame_id {
        FrameId::Telemetry => Decoded::Telemetry {
            header,
            telemetry: Telemetry::decode_payload(payload)?,
        },
        FrameId::Configuration => Decoded::Configuration {
            header,
            config: ControllerConfig::decode_payload(payload)?,
        },
        FrameId::CommandAck => Decoded::Acknowledgment {
            header,
            ack: Acknowledgment::decode_payload(payload)?,
        },
        FrameId::Command => Decoded::Command {
            header,
            command: WireCommand::decode_payload(payload)?,
        },
    };
    Ok(decoded)
}

/// 解析一帧命令 body（控制器端与测试使用）
pub fn decode_command(body: &[u8]) -> Result<(FrameHeader, Command), ProtocolError> {
    let header = FrameHeader::decode(body)?;
    if header.frame_id != FrameId::Command {
        return Err(ProtocolError::ParseError(format!(
            "expected command frame, got {:?}",
            header.frame_id
        )));
    }
    let wire = WireCommand::decode_payload(&body[HEADER_LEN..])?;
    Ok((header, Command::from_wire(&wire)?))
}

/// 流式帧重组器
///
/// 长度前缀不可信（小于帧头或大于 [`MAX_BODY_LEN`]）时，流已无法对齐，
/// 丢弃当前缓冲区全部内容并以 `Malformed` 上报。
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4 * MAX_BODY_LEN),
        }
    }

    /// 追加从流中读到的字节
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// 取出下一帧；数据不足时返回 `None`
    pub fn next_frame(&mut self) -> Option<Decoded> {
        if self.buf.len() < LENGTH_PREFIX_LEN {
            return None;
        }

        let mut prefix = &self.buf[..LENGTH_PREFIX_LEN];
        let body_len = prefix.get_u32_le() as usize;
        if !(HEADER_LEN..=MAX_BODY_LEN).contains(&body_len) {
            let raw = self.buf.split().freeze();
            return Some(Decoded::Malformed {
                raw,
                reason: ProtocolError::ParseError(format!("frame length {} out of range", body_len)),
            });
        }

        if self.buf.len() < LENGTH_PREFIX_LEN + body_len {
            return None;
        }

        self.buf.advance(LENGTH_PREFIX_LEN);
        let body = self.buf.split_to(body_len);
        Some(decode(&body))
    }

    /// 缓冲区中尚未成帧的字节数
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::CommandStatus;
    use crate::state::{CommandSource, ControllerState, EnabledSubstate};
    use proptest::prelude::*;

    fn telemetry_frame(counter: u32) -> Bytes {
        let header = FrameHeader::new(FrameId::Telemetry, counter).with_tai(1_700_000_000.25);
        let telemetry = Telemetry {
            state: ControllerState::Enabled(EnabledSubstate::Stationary),
            current_pos: 12.5,
            application_status: 0x4,
            ..Default::default()
        };
        encode_telemetry(&header, &telemetry)
    }

    #[test]
    fn test_length_prefix_counts_body_only() {
        let frame = encode_command(&Command::Stop, 9);
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, HEADER_LEN + COMMAND_PAYLOAD_LEN);
        assert_eq!(frame.len(), LENGTH_PREFIX_LEN + len);
    }

    #[test]
    fn test_decode_telemetry_frame() {
        let frame = telemetry_frame(42);
        match decode(&frame[LENGTH_PREFIX_LEN..]) {
            Decoded::Telemetry { header, telemetry } => {
                assert_eq!(header.counter, 42);
                assert_eq!(header.tai(), 1_700_000_000.25);
                assert_eq!(telemetry.current_pos, 12.5);
                assert_eq!(telemetry.command_source(), CommandSource::Gui);
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_command_frame() {
        let frame = encode_command(&Command::PositionSet { position: -45.0 }, 3);
        match decode(&frame[LENGTH_PREFIX_LEN..]) {
            Decoded::Command { header, command } => {
                assert_eq!(header.counter, 3);
                assert_eq!(
                    Command::from_wire(&command).unwrap(),
                    Command::PositionSet { position: -45.0 }
                );
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_command_reproduces_command() {
        let command = Command::SetConstantVel {
            velocity: -2.0,
            duration: 30.0,
        };
        let frame = encode_command(&command, 11);
        let (header, decoded) = decode_command(&frame[LENGTH_PREFIX_LEN..]).unwrap();
        assert_eq!(header.counter, 11);
        assert_eq!(decoded, command);

        let telemetry = telemetry_frame(1);
        assert!(decode_command(&telemetry[LENGTH_PREFIX_LEN..]).is_err());
    }

    #[test]
    fn test_decode_ack_frame() {
        let header = FrameHeader::new(FrameId::CommandAck, 0);
        let frame = encode_ack(&header, &Acknowledgment::no_ack(5, "Not supported in the simulator."));
        match decode(&frame[LENGTH_PREFIX_LEN..]) {
            Decoded::Acknowledgment { ack, .. } => {
                assert_eq!(ack.counter, 5);
                assert_eq!(ack.status, CommandStatus::NoAck);
                assert_eq!(ack.reason, "Not supported in the simulator.");
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_ack_reason_stays_within_one_frame() {
        let header = FrameHeader::new(FrameId::CommandAck, 0);
        let reason = "é".repeat(3 * MAX_BODY_LEN);
        let frame = encode_ack(&header, &Acknowledgment::no_ack(8, reason.clone()));
        assert!(frame.len() <= LENGTH_PREFIX_LEN + MAX_BODY_LEN);

        let mut reader = FrameReader::new();
        reader.push(&frame);
        reader.push(&telemetry_frame(2));
        match reader.next_frame() {
            Some(Decoded::Acknowledgment { ack, .. }) => {
                assert_eq!(ack.counter, 8);
                assert!(reason.starts_with(&ack.reason));
            },
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(reader.next_frame(), Some(Decoded::Telemetry { .. })));
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let frame = telemetry_frame(1);
        let body = &frame[LENGTH_PREFIX_LEN..frame.len() - 8];
        match decode(body) {
            Decoded::Malformed { raw, reason } => {
                assert_eq!(raw.len(), body.len());
                assert!(matches!(reason, ProtocolError::InvalidLength { .. }));
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_state_code_is_malformed() {
        let frame = telemetry_frame(1);
        let mut body = frame[LENGTH_PREFIX_LEN..].to_vec();
        // state 字段位于负载偏移 68
        let offset = HEADER_LEN + 68;
        body[offset..offset + 8].copy_from_slice(&9.0f64.to_le_bytes());
        assert!(decode(&body).is_malformed());
    }

    #[test]
    fn test_reader_reassembles_split_frames() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&telemetry_frame(1));
        stream.extend_from_slice(&telemetry_frame(2));

        let mut reader = FrameReader::new();
        reader.push(&stream[..7]);
        assert!(reader.next_frame().is_none());
        reader.push(&stream[7..]);

        let first = reader.next_frame().unwrap();
        let second = reader.next_frame().unwrap();
        assert_eq!(first.header().unwrap().counter, 1);
        assert_eq!(second.header().unwrap().counter, 2);
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_drops_buffer_on_bad_length() {
        let mut reader = FrameReader::new();
        reader.push(&u32::MAX.to_le_bytes());
        reader.push(&[0xAA; 16]);
        assert!(reader.next_frame().unwrap().is_malformed());
        assert_eq!(reader.buffered(), 0);

        // 丢弃后可以继续接收正常帧
        reader.push(&telemetry_frame(3));
        assert!(matches!(reader.next_frame(), Some(Decoded::Telemetry { .. })));
    }

    #[test]
    fn test_reader_keeps_going_after_malformed_body() {
        let good = telemetry_frame(7);
        let mut bad = good.to_vec();
        bad[LENGTH_PREFIX_LEN] = 0xEE; // 未知帧类型

        let mut reader = FrameReader::new();
        reader.push(&bad);
        reader.push(&good);
        assert!(reader.next_frame().unwrap().is_malformed());
        assert_eq!(reader.next_frame().unwrap().header().unwrap().counter, 7);
    }

    proptest! {
        /// 任意字节都不会导致 panic
        #[test]
        fn decode_never_panics(body in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode(&body);
        }

        /// 任意切分方式都得到相同的帧序列
        #[test]
        fn reader_is_chunking_independent(split in 1usize..200) {
            let mut stream = Vec::new();
            for counter in 0..3 {
                stream.extend_from_slice(&telemetry_frame(counter));
            }

            let mut reader = FrameReader::new();
            let mut counters = Vec::new();
            for chunk in stream.chunks(split) {
                reader.push(chunk);
                while let Some(frame) = reader.next_frame() {
                    prop_assert!(!frame.is_malformed());
                    counters.push(frame.header().map(|h| h.counter));
                }
            }
            prop_assert_eq!(counters, vec![Some(0), Some(1), Some(2)]);
        }
    }
}
