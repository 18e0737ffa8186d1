//! 配置帧（控制器 → 客户端）
//!
//! 控制器在连接建立时以及每次配置变更后发送一次完整快照。

use crate::ProtocolError;
use bytes::{Buf, BufMut};

/// 配置负载长度：12 个 f64 + 1 字节 drives_enabled
pub const CONFIG_PAYLOAD_LEN: usize = 12 * 8 + 1;

/// 控制器配置快照
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    /// 速度限制（deg/s）
    pub velocity_limit: f64,
    /// 加速度限制（deg/s²）
    pub accel_limit: f64,
    /// 位置误差阈值（deg）
    pub pos_error_threshold: f64,
    /// 位置上限（deg）
    pub upper_pos_limit: f64,
    /// 位置下限（deg）
    pub lower_pos_limit: f64,
    /// 跟随误差阈值（deg）
    pub following_error_threshold: f64,
    /// 跟踪成功阈值（deg）
    pub track_success_pos_threshold: f64,
    /// 跟踪丢失超时（s）
    pub tracking_lost_timeout: f64,
    /// 紧急 jerk 限制（deg/s³）
    pub emergency_jerk_limit: f64,
    /// 紧急加速度限制（deg/s²）
    pub emergency_accel_limit: f64,
    /// 位置限位禁用的最长时间（s）
    pub disable_limit_max_time: f64,
    /// 速度限制的上限（deg/s）
    pub max_velocity_limit: f64,
    /// 驱动器是否使能
    pub drives_enabled: bool,
}

impl ControllerConfig {
    pub fn encode_payload(&self, buf: &mut impl BufMut) {
        for value in self.values() {
            buf.put_f64_le(value);
        }
        buf.put_u8(u8::from(self.drives_enabled));
    }

    pub fn decode_payload(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != CONFIG_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: CONFIG_PAYLOAD_LEN,
                actual: buf.len(),
            });
        }

        let mut values = [0.0f64; 12];
        for value in values.iter_mut() {
            *value = buf.get_f64_le();
        }
        let drives_enabled = match buf.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(ProtocolError::InvalidValue {
                    field: "drives_enabled",
                    value: other as f64,
                });
            },
        };

        let [
            velocity_limit,
            accel_limit,
            pos_error_threshold,
            upper_pos_limit,
            lower_pos_limit,
            following_error_threshold,
            track_success_pos_threshold,
            tracking_lost_timeout,
            emergency_jerk_limit,
            emergency_accel_limit,
            disable_limit_max_time,
            max_velocity_limit,
        ] = values;

        Ok(Self {
            velocity_limit,
            accel_limit,
            pos_error_threshold,
            upper_pos_limit,
            lower_pos_limit,
            following_error_threshold,
            track_success_pos_threshold,
            tracking_lost_timeout,
            emergency_jerk_limit,
            emergency_accel_limit,
            disable_limit_max_time,
            max_velocity_limit,
            drives_enabled,
        })
    }

    fn values(&self) -> [f64; 12] {
        [
            self.velocity_limit,
            self.accel_limit,
            self.pos_error_threshold,
            self.upper_pos_limit,
            self.lower_pos_limit,
            self.following_error_threshold,
            self.track_success_pos_threshold,
            self.tracking_lost_timeout,
            self.emergency_jerk_limit,
            self.emergency_accel_limit,
            self.disable_limit_max_time,
            self.max_velocity_limit,
        ]
    }
}
