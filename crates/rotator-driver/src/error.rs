//! 连接层错误类型定义

use rotator_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// 连接层错误类型
#[derive(Error, Debug)]
pub enum SessionError {
    /// 连接超时
    #[error("Timed out while connecting to the controller")]
    ConnectTimeout,

    /// 控制器拒绝连接
    #[error("Connection refused by the controller.")]
    ConnectRefused,

    /// 地址解析失败
    #[error("Could not resolve controller address {0}")]
    AddressResolution(String),

    /// 连接已丢失（流停滞、EOF 或套接字错误）
    #[error("Connection to the controller was lost")]
    ConnectionLost,

    /// 当前没有活动连接
    #[error("Not connected to the controller")]
    NotConnected,

    /// 命令通道已满（缓冲区容量 10）
    #[error("Command channel full (buffer size: 10)")]
    ChannelFull,

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 其他 I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// 把 `connect_timeout` 的错误映射为连接层错误
    pub(crate) fn from_connect_error(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SessionError::ConnectTimeout,
            io::ErrorKind::ConnectionRefused => SessionError::ConnectRefused,
            _ => SessionError::Io(err),
        }
    }
}
