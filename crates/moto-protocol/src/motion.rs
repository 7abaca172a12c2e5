//! 运动控制命令与回复
//!
//! 命令帧通过与轨迹点相同的连接发送，控制器对每条命令返回一条
//! [`MotionReply`]。回复的 `result` 字段区别于头部回复码：`Busy`
//! 表示流控（原样重发），其余非 `Success` 结果为失败并附带子码。

use crate::{
    ByteReader, ByteWriter, MAX_NUM_JOINTS, MotionCtrlCmd, MotionReplyResult, ProtocolError,
    not_ready_subcode,
};

/// 运动控制命令帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCtrl {
    /// 目标运动组编号（0 为默认组 / 控制器全局命令）
    pub robot_id: i32,
    /// 序号（控制器回显，通常为 0）
    pub seq: i32,
    /// 命令编号
    pub command: MotionCtrlCmd,
    /// 命令参数（含义随命令而定，如 SelectTool 的工具号）
    pub data: [f32; MAX_NUM_JOINTS],
}

impl MotionCtrl {
    pub fn new(robot_id: i32, seq: i32, command: MotionCtrlCmd) -> Self {
        Self {
            robot_id,
            seq,
            command,
            data: [0.0; MAX_NUM_JOINTS],
        }
    }

    /// 附带一个标量参数（写入 data[0]）
    pub fn with_arg(mut self, arg: f32) -> Self {
        self.data[0] = arg;
        self
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.robot_id);
        w.write_i32(self.seq);
        w.write_i32(self.command.into());
        for v in &self.data {
            w.write_f32(*v);
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let robot_id = r.read_i32()?;
        let seq = r.read_i32()?;
        let raw_cmd = r.read_i32()?;
        let command = MotionCtrlCmd::try_from(raw_cmd).map_err(|_| ProtocolError::InvalidValue {
            field: "command",
            value: raw_cmd,
        })?;
        let mut data = [0.0; MAX_NUM_JOINTS];
        for v in data.iter_mut() {
            *v = r.read_f32()?;
        }
        Ok(Self {
            robot_id,
            seq,
            command,
            data,
        })
    }
}

/// 运动控制回复帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionReply {
    /// 运动组编号
    pub robot_id: i32,
    /// 回显的序号
    pub seq: i32,
    /// 回显的命令编号（原样透传，可能是轨迹点消息类型）
    pub command: i32,
    /// 结果码
    pub result: MotionReplyResult,
    /// 结果子码（细分原因）
    pub subcode: i32,
    /// 附加数据（如 CheckQueueCnt 的队列深度）
    pub data: [f32; MAX_NUM_JOINTS],
}

impl MotionReply {
    pub fn new(robot_id: i32, seq: i32, command: i32, result: MotionReplyResult) -> Self {
        Self {
            robot_id,
            seq,
            command,
            result,
            subcode: 0,
            data: [0.0; MAX_NUM_JOINTS],
        }
    }

    /// 附带子码
    pub fn with_subcode(mut self, subcode: i32) -> Self {
        self.subcode = subcode;
        self
    }

    /// 生成控制器侧的可读诊断文本
    ///
    /// 用于失败回复的错误上报；`Success` 与 `Busy` 也有对应文本，
    /// 便于日志输出。
    pub fn error_string(&self) -> String {
        let result_str = match self.result {
            MotionReplyResult::Success => "Success",
            MotionReplyResult::Busy => "Busy",
            MotionReplyResult::Failure => "Failed",
            MotionReplyResult::Invalid => "Invalid message",
            MotionReplyResult::Alarm => "Controller alarm",
            MotionReplyResult::NotReady => "Not ready",
            MotionReplyResult::MfFailure => "M+ failure",
        };

        if self.result == MotionReplyResult::NotReady {
            let subcode_str = match self.subcode {
                not_ready_subcode::UNSPECIFIED => "Unspecified",
                not_ready_subcode::ALARM => "Controller alarm active",
                not_ready_subcode::ERROR => "Controller error active",
                not_ready_subcode::ESTOP => "E-Stop active",
                not_ready_subcode::NOT_PLAY => "Not in PLAY mode",
                not_ready_subcode::NOT_REMOTE => "Not in REMOTE mode",
                not_ready_subcode::SERVO_OFF => "Servo power off",
                not_ready_subcode::HOLD => "HOLD active",
                not_ready_subcode::NOT_STARTED => "Trajectory mode not started",
                not_ready_subcode::WAITING_ROS => "Waiting on client connection",
                _ => "Unknown",
            };
            format!("{result_str} ({subcode_str})")
        } else if self.subcode != 0 {
            format!("{result_str} (subcode: {})", self.subcode)
        } else {
            result_str.to_string()
        }
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.robot_id);
        w.write_i32(self.seq);
        w.write_i32(self.command);
        w.write_i32(self.result.into());
        w.write_i32(self.subcode);
        for v in &self.data {
            w.write_f32(*v);
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let robot_id = r.read_i32()?;
        let seq = r.read_i32()?;
        let command = r.read_i32()?;
        let raw_result = r.read_i32()?;
        let result =
            MotionReplyResult::try_from(raw_result).map_err(|_| ProtocolError::InvalidValue {
                field: "result",
                value: raw_result,
            })?;
        let subcode = r.read_i32()?;
        let mut data = [0.0; MAX_NUM_JOINTS];
        for v in data.iter_mut() {
            *v = r.read_f32()?;
        }
        Ok(Self {
            robot_id,
            seq,
            command,
            result,
            subcode,
            data,
        })
    }
}
