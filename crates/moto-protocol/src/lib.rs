//! # Moto Protocol
//!
//! 运动控制器二进制协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `constants`: 消息类型、回复码、特殊序列号等协议常量
//! - `joint`: 固定宽度关节数组（10 槽位）
//! - `traj`: 轨迹点消息（基础 / 完整 / 多组）
//! - `motion`: 运动控制命令帧与回复帧
//!
//! ## 帧格式
//!
//! 所有消息使用长度前缀帧：
//!
//! ```text
//! | length: i32 | msg_type: i32 | comm_type: i32 | reply_code: i32 | body ... |
//! |<- 前缀 ->|<------------- length 字节（头部 + 消息体）------------->|
//! ```
//!
//! ## 字节序
//!
//! 协议固定使用小端字节序（Intel / LSB first）。

pub mod constants;
pub mod joint;
pub mod motion;
pub mod traj;

// 重新导出常用类型
pub use constants::*;
pub use joint::JointData;
pub use motion::{MotionCtrl, MotionReply};
pub use traj::{GroupTrajPtData, JointTrajPt, JointTrajPtFull, JointTrajPtFullEx};

use thiserror::Error;

/// 协议编解码错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 关节数量超过固定槽位宽度
    #[error("Too many joints: {count} (max: {max})")]
    TooManyJoints { count: usize, max: usize },

    /// 多组消息的组数量超过上限
    #[error("Too many motion groups: {count} (max: {max})")]
    TooManyGroups { count: usize, max: usize },

    /// 未知消息类型
    #[error("Unknown message type: {msg_type}")]
    UnknownMessageType { msg_type: i32 },

    /// 字段值无效（如未知回复码）
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i32 },

    /// 消息体长度不足
    #[error("Truncated message: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// 通信类型（请求 / 回复 / 主题）
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(i32)]
pub enum CommType {
    Invalid = 0,
    /// 单向推送，无回复
    Topic = 1,
    /// 请求，期待回复
    ServiceRequest = 2,
    /// 对请求的回复
    ServiceReply = 3,
}

/// 通用回复码（头部字段，区别于运动回复的 result 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(i32)]
pub enum ReplyCode {
    Invalid = 0,
    Success = 1,
    Failure = 2,
}

/// 消息体（按消息类型区分）
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    JointTrajPt(JointTrajPt),
    JointTrajPtFull(JointTrajPtFull),
    JointTrajPtFullEx(JointTrajPtFullEx),
    MotionCtrl(MotionCtrl),
    MotionReply(MotionReply),
}

/// 协议消息（头部 + 消息体）
///
/// 消息一经构造即为不可变值对象；编码和解码满足往返一致性。
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleMessage {
    /// 通信类型
    pub comm_type: CommType,
    /// 头部回复码（仅对 ServiceReply 有意义）
    pub reply_code: ReplyCode,
    /// 消息体
    pub body: MessageBody,
}

impl SimpleMessage {
    /// 以请求形式包装消息体
    pub fn request(body: MessageBody) -> Self {
        Self {
            comm_type: CommType::ServiceRequest,
            reply_code: ReplyCode::Invalid,
            body,
        }
    }

    /// 以主题形式包装消息体
    pub fn topic(body: MessageBody) -> Self {
        Self {
            comm_type: CommType::Topic,
            reply_code: ReplyCode::Invalid,
            body,
        }
    }

    /// 以回复形式包装消息体
    pub fn reply(body: MessageBody, reply_code: ReplyCode) -> Self {
        Self {
            comm_type: CommType::ServiceReply,
            reply_code,
            body,
        }
    }

    /// 获取消息类型编号
    pub fn msg_type(&self) -> i32 {
        match &self.body {
            MessageBody::JointTrajPt(_) => msg_types::JOINT_TRAJ_PT,
            MessageBody::JointTrajPtFull(_) => msg_types::JOINT_TRAJ_PT_FULL,
            MessageBody::JointTrajPtFullEx(_) => msg_types::MOTO_JOINT_TRAJ_PT_FULL_EX,
            MessageBody::MotionCtrl(_) => msg_types::MOTO_MOTION_CTRL,
            MessageBody::MotionReply(_) => msg_types::MOTO_MOTION_REPLY,
        }
    }

    /// 编码为完整帧（含 4 字节长度前缀）
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        // 先占位长度前缀
        w.write_i32(0);
        w.write_i32(self.msg_type());
        w.write_i32(i32::from(self.comm_type));
        w.write_i32(i32::from(self.reply_code));
        match &self.body {
            MessageBody::JointTrajPt(pt) => pt.write(&mut w),
            MessageBody::JointTrajPtFull(pt) => pt.write(&mut w),
            MessageBody::JointTrajPtFullEx(pt) => pt.write(&mut w),
            MessageBody::MotionCtrl(cmd) => cmd.write(&mut w),
            MessageBody::MotionReply(reply) => reply.write(&mut w),
        }
        let mut buf = w.into_inner();
        let payload_len = (buf.len() - PREFIX_SIZE) as i32;
        buf[..PREFIX_SIZE].copy_from_slice(&payload_len.to_le_bytes());
        buf
    }

    /// 从帧负载解码（不含长度前缀）
    ///
    /// 未知消息类型和未知头部字段值均返回 `Err`，从不 panic。
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let msg_type = r.read_i32()?;
        let comm_raw = r.read_i32()?;
        let reply_raw = r.read_i32()?;

        let comm_type = CommType::try_from(comm_raw).map_err(|_| ProtocolError::InvalidValue {
            field: "comm_type",
            value: comm_raw,
        })?;
        let reply_code = ReplyCode::try_from(reply_raw).map_err(|_| ProtocolError::InvalidValue {
            field: "reply_code",
            value: reply_raw,
        })?;

        let body = match msg_type {
            msg_types::JOINT_TRAJ_PT => MessageBody::JointTrajPt(JointTrajPt::read(&mut r)?),
            msg_types::JOINT_TRAJ_PT_FULL => {
                MessageBody::JointTrajPtFull(JointTrajPtFull::read(&mut r)?)
            }
            msg_types::MOTO_JOINT_TRAJ_PT_FULL_EX => {
                MessageBody::JointTrajPtFullEx(JointTrajPtFullEx::read(&mut r)?)
            }
            msg_types::MOTO_MOTION_CTRL => MessageBody::MotionCtrl(MotionCtrl::read(&mut r)?),
            msg_types::MOTO_MOTION_REPLY => MessageBody::MotionReply(MotionReply::read(&mut r)?),
            other => return Err(ProtocolError::UnknownMessageType { msg_type: other }),
        };

        Ok(Self {
            comm_type,
            reply_code,
            body,
        })
    }
}

/// 长度前缀大小（字节）
pub const PREFIX_SIZE: usize = 4;

/// 头部大小（字节）：msg_type + comm_type + reply_code
pub const HEADER_SIZE: usize = 12;

/// 小端字节写入器（协议内部使用）
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::with_capacity(64) }
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// 小端字节读取器（协议内部使用）
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.pos + n > self.buf.len() {
            return Err(ProtocolError::Truncated {
                expected: self.pos + n,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_reader_roundtrip_i32() {
        let mut w = ByteWriter::new();
        w.write_i32(0x12345678);
        w.write_i32(-1);
        let buf = w.into_inner();
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_i32().unwrap(), 0x12345678);
        assert_eq!(r.read_i32().unwrap(), -1);
    }

    #[test]
    fn test_writer_is_little_endian() {
        let mut w = ByteWriter::new();
        w.write_i32(0x12345678);
        assert_eq!(w.into_inner(), vec![0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_reader_truncated() {
        let buf = [0x01, 0x02];
        let mut r = ByteReader::new(&buf);
        let err = r.read_i32().unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_decode_unknown_message_type() {
        let mut w = ByteWriter::new();
        w.write_i32(9999); // 未定义的消息类型
        w.write_i32(CommType::Topic.into());
        w.write_i32(ReplyCode::Invalid.into());
        let buf = w.into_inner();
        let err = SimpleMessage::decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnknownMessageType { msg_type: 9999 }
        ));
    }

    #[test]
    fn test_decode_invalid_comm_type() {
        let mut w = ByteWriter::new();
        w.write_i32(msg_types::JOINT_TRAJ_PT);
        w.write_i32(42); // 无效通信类型
        w.write_i32(ReplyCode::Invalid.into());
        let buf = w.into_inner();
        let err = SimpleMessage::decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidValue {
                field: "comm_type",
                value: 42
            }
        ));
    }

    #[test]
    fn test_encode_length_prefix() {
        let msg = SimpleMessage::request(MessageBody::MotionCtrl(MotionCtrl::new(
            0,
            0,
            MotionCtrlCmd::StopMotion,
        )));
        let buf = msg.encode();
        let len = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - PREFIX_SIZE);
        // 头部 12 字节 + 消息体 52 字节（robot_id/seq/command + 10 个 f32）
        assert_eq!(len, HEADER_SIZE + 52);
    }
}
