//! TCP 连接实现
//!
//! 基于 `std::net::TcpStream` 的长度前缀帧收发。

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use moto_protocol::{PREFIX_SIZE, SimpleMessage};
use tracing::{debug, info, warn};

use crate::{MessageConnection, NetError};

/// 单帧最大长度（字节），用于校验对端声明的长度前缀
const MAX_FRAME_LEN: usize = 4096;

/// 默认单次 IO 超时
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(1);

/// 到控制器运动服务端口的 TCP 连接
///
/// # 线程安全
///
/// 不支持并发使用。一次 `send_and_receive` 是一个不可分割的
/// 请求 / 回复交换，上层必须用互斥锁串行化。
pub struct TcpMessageConnection {
    /// 控制器地址（"ip:port" 形式）
    endpoint: String,
    /// 活动连接（None 表示未连接）
    stream: Option<TcpStream>,
    /// 单次读 / 写超时
    io_timeout: Duration,
}

impl TcpMessageConnection {
    /// 创建未连接的实例
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// 控制器地址
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn open_stream(&self) -> Result<TcpStream, NetError> {
        // 解析可能返回多个地址，依次尝试
        let addrs: Vec<_> = self.endpoint.to_socket_addrs()?.collect();
        let mut last_err: Option<std::io::Error> = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.io_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout))?;
                    stream.set_write_timeout(Some(self.io_timeout))?;
                    // 轨迹点是小帧，逐条等待回复，禁用 Nagle
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(NetError::Io(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address resolved for {}", self.endpoint),
            )
        })))
    }
}

impl MessageConnection for TcpMessageConnection {
    fn connect(&mut self) -> Result<(), NetError> {
        if self.stream.is_some() {
            // 幂等：静默重新建立
            debug!("Already connected to {}, re-establishing", self.endpoint);
            self.stream = None;
        }
        let stream = self.open_stream()?;
        info!("Connected to motion server at {}", self.endpoint);
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send_and_receive(&mut self, request: &SimpleMessage) -> Result<SimpleMessage, NetError> {
        let stream = self.stream.as_mut().ok_or(NetError::NotConnected)?;

        let result = (|| {
            stream.write_all(&request.encode())?;

            let mut prefix = [0u8; PREFIX_SIZE];
            stream.read_exact(&mut prefix)?;
            let len = i32::from_le_bytes(prefix);
            if len <= 0 || len as usize > MAX_FRAME_LEN {
                return Err(NetError::FrameTooLarge {
                    len: len.max(0) as usize,
                    max: MAX_FRAME_LEN,
                });
            }

            let mut payload = vec![0u8; len as usize];
            stream.read_exact(&mut payload)?;
            Ok(SimpleMessage::decode(&payload)?)
        })();

        // 传输层错误后流状态未知（可能半帧），丢弃连接交给上层重连。
        // 协议层解码错误不影响流完整性，连接保留。
        if let Err(NetError::Io(ref e)) = result {
            warn!("Transport error on {}: {e}, dropping connection", self.endpoint);
            self.stream = None;
        }

        result
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("Disconnected from {}", self.endpoint);
        }
    }

    fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
        if let Some(stream) = &self.stream {
            let _ = stream.set_read_timeout(Some(timeout));
            let _ = stream.set_write_timeout(Some(timeout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moto_protocol::{MessageBody, MotionCtrl, MotionCtrlCmd, MotionReply, MotionReplyResult,
        ReplyCode};
    use std::net::TcpListener;

    /// 单回合服务端：读一帧请求，回一帧固定回复
    fn spawn_echo_server(reply: SimpleMessage) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut prefix = [0u8; PREFIX_SIZE];
            socket.read_exact(&mut prefix).unwrap();
            let len = i32::from_le_bytes(prefix) as usize;
            let mut payload = vec![0u8; len];
            socket.read_exact(&mut payload).unwrap();
            socket.write_all(&reply.encode()).unwrap();
        });
        addr
    }

    fn ready_reply() -> SimpleMessage {
        SimpleMessage::reply(
            MessageBody::MotionReply(MotionReply::new(0, 0, 200101, MotionReplyResult::Success)),
            ReplyCode::Success,
        )
    }

    #[test]
    fn test_send_and_receive_roundtrip() {
        let reply = ready_reply();
        let addr = spawn_echo_server(reply.clone());

        let mut conn = TcpMessageConnection::new(addr.to_string());
        conn.connect().unwrap();
        assert!(conn.is_connected());

        let request = SimpleMessage::request(MessageBody::MotionCtrl(MotionCtrl::new(
            0,
            0,
            MotionCtrlCmd::CheckMotionReady,
        )));
        let received = conn.send_and_receive(&request).unwrap();
        assert_eq!(received, reply);
    }

    #[test]
    fn test_send_without_connect_fails() {
        let mut conn = TcpMessageConnection::new("127.0.0.1:1");
        let request = SimpleMessage::request(MessageBody::MotionCtrl(MotionCtrl::new(
            0,
            0,
            MotionCtrlCmd::StopMotion,
        )));
        let err = conn.send_and_receive(&request).unwrap_err();
        assert!(matches!(err, NetError::NotConnected));
    }

    #[test]
    fn test_connect_refused() {
        // 端口 1 基本不会有监听者
        let mut conn = TcpMessageConnection::new("127.0.0.1:1");
        assert!(conn.connect().is_err());
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_disconnect_clears_state() {
        let addr = spawn_echo_server(ready_reply());
        let mut conn = TcpMessageConnection::new(addr.to_string());
        conn.connect().unwrap();
        conn.disconnect();
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_transport_error_drops_connection() {
        // 服务端立即关闭连接
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            drop(socket);
        });

        let mut conn = TcpMessageConnection::new(addr.to_string());
        conn.connect().unwrap();
        // 等服务端把连接关掉
        std::thread::sleep(Duration::from_millis(50));

        let request = SimpleMessage::request(MessageBody::MotionCtrl(MotionCtrl::new(
            0,
            0,
            MotionCtrlCmd::StopMotion,
        )));
        let _ = conn.send_and_receive(&request);
        // 读回复必然失败（对端已关闭），连接应被丢弃
        assert!(!conn.is_connected());
    }
}
