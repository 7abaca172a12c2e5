//! # Moto Net
//!
//! 连接抽象层，提供到运动控制器的消息级连接接口。
//!
//! 控制器侧的传输语义是"有序、一来一回"的请求 / 回复，不支持多路复用，
//! 因此连接实现**不保证并发安全**：上层必须用单一互斥锁串行化所有访问。
//! 断线重连也是上层的职责（连接本身从不自动重试）。

use std::time::Duration;

use moto_protocol::{ProtocolError, SimpleMessage};
use thiserror::Error;

pub mod tcp;

pub use tcp::TcpMessageConnection;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockConnection, MockHandle};

/// 连接层统一错误类型
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Not connected")]
    NotConnected,

    #[error("Receive timeout")]
    Timeout,

    /// 对端声明的帧长度超出协议上限（防御畸形前缀）
    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },
}

/// 消息级连接接口
///
/// 实现者持有一条到控制器的双工字节流。`send_and_receive` 是同步的：
/// 发送一条请求并阻塞直到完整读出一条回复帧（或底层传输出错），
/// 从不部分消费帧。
pub trait MessageConnection {
    /// 建立连接
    ///
    /// 对已连接的实例调用必须幂等（静默重新建立）。
    fn connect(&mut self) -> Result<(), NetError>;

    /// 当前是否认为已连接
    fn is_connected(&self) -> bool;

    /// 发送请求并等待一条完整回复
    fn send_and_receive(&mut self, request: &SimpleMessage) -> Result<SimpleMessage, NetError>;

    /// 断开连接
    fn disconnect(&mut self);

    /// 设置单次 IO 超时（实现可忽略）
    fn set_io_timeout(&mut self, _timeout: Duration) {}
}
