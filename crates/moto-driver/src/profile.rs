//! 控制器档位
//!
//! 不同代际的控制器在校验强度、轨迹点线格式、停止方式和回复语义
//! 上有差异。这些差异收敛为 [`ControllerProfile`] 的几个定制点，
//! 流式循环和外部 API 对档位无感。

use std::sync::Arc;

use moto_protocol::{
    GroupTrajPtData, JointData, JointTrajPt, JointTrajPtFull, JointTrajPtFullEx, MessageBody,
    MotionCtrl, MotionCtrlCmd, MotionReplyResult, ReplyCode, SimpleMessage, special_seq,
    valid_fields,
};
use tracing::warn;

use crate::error::DriverError;
use crate::motion::MotionController;
use crate::pipeline::ConvertedPoint;
use crate::types::{PoseSample, Trajectory, VelocityLimits};
use crate::validator;

/// 一条轨迹点回复的处置方式
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyDisposition {
    /// 点已入队，推进到下一个点
    Ack,
    /// 控制器队列已满（流控），原样重发同一个点
    Busy,
    /// 命令被拒绝，中止整条轨迹（附控制器侧诊断文本）
    Abort(String),
}

/// 控制器档位定制点
pub trait ControllerProfile: Send + Sync {
    /// 档位名（日志用）
    fn name(&self) -> &'static str;

    /// 发送前的轨迹校验
    fn validate(
        &self,
        traj: &Trajectory,
        limits: &VelocityLimits,
        pose: &dyn Fn(i32) -> Option<Arc<PoseSample>>,
    ) -> Result<(), DriverError>;

    /// 把一个转换好的轨迹点编码为线消息
    fn create_message(
        &self,
        seq: i32,
        groups: &[ConvertedPoint],
    ) -> Result<SimpleMessage, DriverError>;

    /// 生成停止命令帧（逐组）
    fn stop_messages(&self, group_ids: &[i32]) -> Vec<SimpleMessage>;

    /// 解读一条轨迹点回复
    fn classify_reply(&self, reply: &SimpleMessage) -> ReplyDisposition;

    /// 提交新命令前的控制器预检
    fn preflight(&self, _motion: &MotionController) -> Result<(), DriverError> {
        Ok(())
    }

    /// 驱动关闭时的善后
    fn on_shutdown(&self, _motion: &MotionController) {}
}

/// 通用档位：基础轨迹点格式（位置 + 速度比例 + 段时长）
///
/// 只支持单组轨迹；停止通过特殊序列号帧完成，无需厂商扩展命令。
pub struct GenericProfile;

impl ControllerProfile for GenericProfile {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn validate(
        &self,
        traj: &Trajectory,
        limits: &VelocityLimits,
        _pose: &dyn Fn(i32) -> Option<Arc<PoseSample>>,
    ) -> Result<(), DriverError> {
        validator::validate_base(traj, limits)
    }

    fn create_message(
        &self,
        seq: i32,
        groups: &[ConvertedPoint],
    ) -> Result<SimpleMessage, DriverError> {
        let [point] = groups else {
            return Err(DriverError::MultiGroupUnsupported);
        };
        let joints = JointData::from_slice(&point.selected.positions)?;
        let pt = JointTrajPt::new(
            seq,
            joints,
            point.velocity_ratio as f32,
            point.duration as f32,
        );
        Ok(SimpleMessage::request(MessageBody::JointTrajPt(pt)))
    }

    fn stop_messages(&self, _group_ids: &[i32]) -> Vec<SimpleMessage> {
        let pt = JointTrajPt::new(special_seq::STOP_TRAJECTORY, JointData::new(), 0.0, 0.0);
        vec![SimpleMessage::request(MessageBody::JointTrajPt(pt))]
    }

    fn classify_reply(&self, reply: &SimpleMessage) -> ReplyDisposition {
        // 通用控制器只看头部回复码
        match reply.reply_code {
            ReplyCode::Success => ReplyDisposition::Ack,
            ReplyCode::Failure => ReplyDisposition::Abort("Controller rejected point".into()),
            ReplyCode::Invalid => ReplyDisposition::Abort("Invalid reply code".into()),
        }
    }
}

/// Motoman 档位：完整 / 多组轨迹点格式 + 厂商扩展运动控制
///
/// 实时插补要求每个点带速度，且轨迹必须从机器人当前位置开始，
/// 因此校验是严格版。停止走 `StopMotion` 命令（清空控制器队列）。
pub struct MotoProfile;

impl MotoProfile {
    fn group_data(point: &ConvertedPoint) -> Result<GroupTrajPtData, DriverError> {
        let mut fields = valid_fields::TIME | valid_fields::POSITION;
        if !point.selected.velocities.is_empty() {
            fields |= valid_fields::VELOCITY;
        }
        if !point.selected.accelerations.is_empty() {
            fields |= valid_fields::ACCELERATION;
        }
        Ok(GroupTrajPtData {
            group_id: point.group_id,
            valid_fields: fields,
            time: point.selected.time_from_start as f32,
            positions: JointData::from_slice(&point.selected.positions)?,
            velocities: JointData::from_slice(&point.selected.velocities)?,
            accelerations: JointData::from_slice(&point.selected.accelerations)?,
        })
    }
}

impl ControllerProfile for MotoProfile {
    fn name(&self) -> &'static str {
        "motoman"
    }

    fn validate(
        &self,
        traj: &Trajectory,
        limits: &VelocityLimits,
        pose: &dyn Fn(i32) -> Option<Arc<PoseSample>>,
    ) -> Result<(), DriverError> {
        validator::validate_base(traj, limits)?;
        validator::validate_strict(traj, pose)
    }

    fn create_message(
        &self,
        seq: i32,
        groups: &[ConvertedPoint],
    ) -> Result<SimpleMessage, DriverError> {
        match groups {
            [] => Err(DriverError::Validation(
                "Trajectory point has no group data".into(),
            )),
            [point] => {
                let mut pt = JointTrajPtFull::new(
                    point.group_id,
                    seq,
                    point.selected.time_from_start as f32,
                );
                pt.set_positions(JointData::from_slice(&point.selected.positions)?);
                if !point.selected.velocities.is_empty() {
                    pt.set_velocities(JointData::from_slice(&point.selected.velocities)?);
                }
                if !point.selected.accelerations.is_empty() {
                    pt.set_accelerations(JointData::from_slice(&point.selected.accelerations)?);
                }
                Ok(SimpleMessage::request(MessageBody::JointTrajPtFull(pt)))
            }
            many => {
                let blocks = many
                    .iter()
                    .map(Self::group_data)
                    .collect::<Result<Vec<_>, _>>()?;
                let pt = JointTrajPtFullEx::new(seq, blocks)?;
                Ok(SimpleMessage::request(MessageBody::JointTrajPtFullEx(pt)))
            }
        }
    }

    fn stop_messages(&self, group_ids: &[i32]) -> Vec<SimpleMessage> {
        group_ids
            .iter()
            .map(|&id| {
                SimpleMessage::request(MessageBody::MotionCtrl(MotionCtrl::new(
                    id,
                    0,
                    MotionCtrlCmd::StopMotion,
                )))
            })
            .collect()
    }

    fn classify_reply(&self, reply: &SimpleMessage) -> ReplyDisposition {
        match &reply.body {
            MessageBody::MotionReply(r) => match r.result {
                MotionReplyResult::Success => ReplyDisposition::Ack,
                MotionReplyResult::Busy => ReplyDisposition::Busy,
                _ => ReplyDisposition::Abort(r.error_string()),
            },
            _ => ReplyDisposition::Abort("Unexpected reply message type".into()),
        }
    }

    fn preflight(&self, motion: &MotionController) -> Result<(), DriverError> {
        motion.check_ready()
    }

    fn on_shutdown(&self, motion: &MotionController) {
        if let Err(e) = motion.stop_motion() {
            warn!("Stop motion on shutdown failed: {e}");
        }
        if let Err(e) = motion.set_traj_mode(false) {
            warn!("Leaving trajectory mode on shutdown failed: {e}");
        }
    }
}
