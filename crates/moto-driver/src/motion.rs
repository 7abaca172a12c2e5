//! 运动模式控制
//!
//! 通过共享连接发送运动控制命令并解读回复。每个方法是一次同步的
//! 请求 / 回复交换，交换全程持有连接锁（与流式循环互斥）。

use std::sync::{Arc, Mutex};

use moto_net::MessageConnection;
use moto_protocol::{
    MessageBody, MotionCtrl, MotionCtrlCmd, MotionReply, MotionReplyResult, SimpleMessage,
};
use tracing::{debug, info};

use crate::error::DriverError;

/// 运动模式控制器
///
/// 可克隆，多个持有者共享同一条连接。
#[derive(Clone)]
pub struct MotionController {
    conn: Arc<Mutex<Box<dyn MessageConnection + Send>>>,
    robot_id: i32,
}

impl MotionController {
    pub fn new(conn: Arc<Mutex<Box<dyn MessageConnection + Send>>>, robot_id: i32) -> Self {
        Self { conn, robot_id }
    }

    /// 共享连接（流式循环与外部 API 共用）
    pub(crate) fn connection(&self) -> &Arc<Mutex<Box<dyn MessageConnection + Send>>> {
        &self.conn
    }

    /// 默认运动组编号
    pub fn robot_id(&self) -> i32 {
        self.robot_id
    }

    /// 发送一条控制命令并等待运动回复
    fn exchange(&self, ctrl: MotionCtrl) -> Result<MotionReply, DriverError> {
        let request = SimpleMessage::request(MessageBody::MotionCtrl(ctrl));
        let mut conn = self.conn.lock().map_err(|_| DriverError::PoisonedLock)?;
        if !conn.is_connected() {
            conn.connect()?;
        }
        let reply = conn.send_and_receive(&request)?;
        match reply.body {
            MessageBody::MotionReply(r) => Ok(r),
            _ => Err(DriverError::UnexpectedReply {
                expected: "MotionReply",
            }),
        }
    }

    /// 查询控制器是否就绪（伺服上电、无报警、无急停）
    ///
    /// # 错误
    /// - `DriverError::NotReady`: 控制器未就绪，附控制器侧诊断文本
    pub fn check_ready(&self) -> Result<(), DriverError> {
        let reply = self.exchange(MotionCtrl::new(
            self.robot_id,
            0,
            MotionCtrlCmd::CheckMotionReady,
        ))?;
        if reply.result == MotionReplyResult::Success {
            debug!("Controller reports motion ready");
            Ok(())
        } else {
            Err(DriverError::NotReady(reply.error_string()))
        }
    }

    /// 查询控制器运动队列深度
    pub fn queue_count(&self) -> Result<i32, DriverError> {
        let reply = self.exchange(MotionCtrl::new(
            self.robot_id,
            0,
            MotionCtrlCmd::CheckQueueCnt,
        ))?;
        if reply.result == MotionReplyResult::Success {
            Ok(reply.data[0] as i32)
        } else {
            Err(DriverError::ControllerFault(reply.error_string()))
        }
    }

    /// 立即停止运动并清空控制器队列
    pub fn stop_motion(&self) -> Result<(), DriverError> {
        let reply = self.exchange(MotionCtrl::new(
            self.robot_id,
            0,
            MotionCtrlCmd::StopMotion,
        ))?;
        if reply.result == MotionReplyResult::Success {
            info!("Motion stopped");
            Ok(())
        } else {
            Err(DriverError::ControllerFault(reply.error_string()))
        }
    }

    /// 进入 / 退出轨迹执行模式
    pub fn set_traj_mode(&self, enable: bool) -> Result<(), DriverError> {
        let cmd = if enable {
            MotionCtrlCmd::StartTrajMode
        } else {
            MotionCtrlCmd::StopTrajMode
        };
        let reply = self.exchange(MotionCtrl::new(self.robot_id, 0, cmd))?;
        if reply.result == MotionReplyResult::Success {
            info!(enable, "Trajectory mode changed");
            Ok(())
        } else if enable {
            // 进入失败通常是控制器条件不满足（非 PLAY / 伺服断电等）
            Err(DriverError::NotReady(reply.error_string()))
        } else {
            Err(DriverError::ControllerFault(reply.error_string()))
        }
    }

    /// 切换指定组的工具文件
    pub fn select_tool(&self, group_id: i32, tool: i32) -> Result<(), DriverError> {
        let ctrl =
            MotionCtrl::new(group_id, 0, MotionCtrlCmd::SelectTool).with_arg(tool as f32);
        let reply = self.exchange(ctrl)?;
        if reply.result == MotionReplyResult::Success {
            info!(group_id, tool, "Tool selected");
            Ok(())
        } else {
            Err(DriverError::ControllerFault(reply.error_string()))
        }
    }
}
