//! Mock 连接（测试用，无硬件）
//!
//! 通过 [`MockHandle`] 预置脚本化回复、注入传输错误，并在事后
//! 检查驱动实际发出的消息序列。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use moto_protocol::{
    MessageBody, MotionReply, MotionReplyResult, ReplyCode, SimpleMessage,
};

use crate::{MessageConnection, NetError};

/// 脚本条目：一条回复或一次注入的传输错误
enum ScriptEntry {
    Reply(SimpleMessage),
    IoError,
}

struct Shared {
    /// 预置的回复脚本（FIFO）
    script: VecDeque<ScriptEntry>,
    /// 驱动发出的全部消息
    sent: Vec<SimpleMessage>,
    /// 剩余的失败连接次数（模拟服务端不可达）
    fail_connects: usize,
    /// 连接尝试计数
    connect_attempts: usize,
}

/// Mock 连接
///
/// 脚本为空时默认回复 `Success` 运动回复，便于编写快乐路径测试。
pub struct MockConnection {
    shared: Arc<Mutex<Shared>>,
    connected: bool,
}

/// 测试侧句柄（可克隆，跨线程共享）
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnection {
    /// 创建 mock 连接和配套句柄
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            script: VecDeque::new(),
            sent: Vec::new(),
            fail_connects: 0,
            connect_attempts: 0,
        }));
        (
            Self {
                shared: shared.clone(),
                connected: false,
            },
            MockHandle { shared },
        )
    }
}

impl MessageConnection for MockConnection {
    fn connect(&mut self) -> Result<(), NetError> {
        let mut shared = self.shared.lock().unwrap();
        shared.connect_attempts += 1;
        if shared.fail_connects > 0 {
            shared.fail_connects -= 1;
            self.connected = false;
            return Err(NetError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock connect failure",
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_and_receive(&mut self, request: &SimpleMessage) -> Result<SimpleMessage, NetError> {
        if !self.connected {
            return Err(NetError::NotConnected);
        }
        let mut shared = self.shared.lock().unwrap();
        shared.sent.push(request.clone());
        match shared.script.pop_front() {
            Some(ScriptEntry::Reply(reply)) => Ok(reply),
            Some(ScriptEntry::IoError) => {
                self.connected = false;
                Err(NetError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock transport failure",
                )))
            }
            None => Ok(success_reply()),
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

impl MockHandle {
    /// 预置一条完整回复
    pub fn push_reply(&self, reply: SimpleMessage) {
        self.shared.lock().unwrap().script.push_back(ScriptEntry::Reply(reply));
    }

    /// 预置一条指定结果码的运动回复
    pub fn push_result(&self, result: MotionReplyResult) {
        self.push_reply(motion_reply(result, 0));
    }

    /// 预置一条带子码的运动回复
    pub fn push_result_with_subcode(&self, result: MotionReplyResult, subcode: i32) {
        self.push_reply(motion_reply(result, subcode));
    }

    /// 预置一次传输错误（该次交换后连接断开）
    pub fn push_io_error(&self) {
        self.shared.lock().unwrap().script.push_back(ScriptEntry::IoError);
    }

    /// 预置接下来 `n` 次 `connect()` 失败
    pub fn fail_next_connects(&self, n: usize) {
        self.shared.lock().unwrap().fail_connects = n;
    }

    /// 已发送消息的快照
    pub fn sent(&self) -> Vec<SimpleMessage> {
        self.shared.lock().unwrap().sent.clone()
    }

    /// 已发送消息数量
    pub fn sent_count(&self) -> usize {
        self.shared.lock().unwrap().sent.len()
    }

    /// 连接尝试次数
    pub fn connect_attempts(&self) -> usize {
        self.shared.lock().unwrap().connect_attempts
    }
}

fn motion_reply(result: MotionReplyResult, subcode: i32) -> SimpleMessage {
    SimpleMessage::reply(
        MessageBody::MotionReply(MotionReply::new(0, 0, 0, result).with_subcode(subcode)),
        ReplyCode::Success,
    )
}

/// 默认的成功回复
pub fn success_reply() -> SimpleMessage {
    motion_reply(MotionReplyResult::Success, 0)
}
