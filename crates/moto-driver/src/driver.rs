//! 驱动门面
//!
//! [`TrajectoryStreamer`] 聚合连接、转换流水线、校验、流式循环和
//! 运动模式控制，对外提供同步 API。构造时启动后台流式线程，
//! Drop 时停机并回收线程。

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, unbounded};
use moto_net::MessageConnection;
use moto_protocol::SimpleMessage;
use tracing::{info, warn};

use crate::error::DriverError;
use crate::motion::MotionController;
use crate::pipeline::{ConvertedPoint, IdentityTransform, JointTransform, PointConverter};
use crate::profile::{ControllerProfile, ReplyDisposition};
use crate::state::{StreamerContext, TransferState};
use crate::streamer::{StreamEvent, StreamerConfig, streaming_loop};
use crate::types::{RobotGroup, Trajectory, TrajectoryPoint, VelocityLimits};

/// 轨迹流式驱动
///
/// # 并发
///
/// 所有方法都可以在流式线程活动时调用。新命令覆盖旧命令
/// （latest-command-wins）：提交期间在途的旧确认会被代际比较丢弃。
pub struct TrajectoryStreamer {
    motion: MotionController,
    ctx: Arc<StreamerContext>,
    profile: Arc<dyn ControllerProfile>,
    /// 组编号 → 转换器。锁顺序：先转换器锁，后缓冲锁。
    converters: Mutex<HashMap<i32, PointConverter>>,
    group_ids: Vec<i32>,
    limits: VelocityLimits,
    events: Receiver<StreamEvent>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TrajectoryStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrajectoryStreamer")
            .field("group_ids", &self.group_ids)
            .finish_non_exhaustive()
    }
}

impl TrajectoryStreamer {
    /// 创建驱动并启动流式线程
    ///
    /// 构造时尝试建立连接；失败只记日志，后续由流式循环和各命令
    /// 路径按需重连（控制器可能晚于驱动上电）。
    pub fn new(
        conn: Box<dyn MessageConnection + Send>,
        groups: Vec<RobotGroup>,
        limits: VelocityLimits,
        profile: Arc<dyn ControllerProfile>,
        config: StreamerConfig,
    ) -> Result<Self, DriverError> {
        Self::with_transform(conn, groups, limits, profile, config, Arc::new(IdentityTransform))
    }

    /// 同 [`Self::new`]，但指定逐点坐标变换
    pub fn with_transform(
        conn: Box<dyn MessageConnection + Send>,
        groups: Vec<RobotGroup>,
        limits: VelocityLimits,
        profile: Arc<dyn ControllerProfile>,
        config: StreamerConfig,
        transform: Arc<dyn JointTransform>,
    ) -> Result<Self, DriverError> {
        if groups.is_empty() {
            return Err(DriverError::Config("No motion groups configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for group in &groups {
            if !seen.insert(group.group_id()) {
                return Err(DriverError::Config(format!(
                    "Duplicate motion group id {}",
                    group.group_id()
                )));
            }
        }

        let conn: Arc<Mutex<Box<dyn MessageConnection + Send>>> = Arc::new(Mutex::new(conn));
        {
            let mut conn = conn.lock().map_err(|_| DriverError::PoisonedLock)?;
            if let Err(e) = conn.connect() {
                warn!("Initial connection failed, will retry while streaming: {e}");
            }
        }

        let group_ids: Vec<i32> = groups.iter().map(|g| g.group_id()).collect();
        let converters = groups
            .into_iter()
            .map(|g| {
                let id = g.group_id();
                (id, PointConverter::new(g, limits.clone(), transform.clone()))
            })
            .collect();

        let ctx = Arc::new(StreamerContext::new(group_ids.iter().copied()));
        let motion = MotionController::new(conn.clone(), group_ids[0]);
        let (tx, rx) = unbounded();
        let thread = {
            let ctx = ctx.clone();
            let profile = profile.clone();
            std::thread::Builder::new()
                .name("moto-streamer".into())
                .spawn(move || streaming_loop(conn, ctx, profile, config, tx))
                .map_err(|e| DriverError::Config(format!("Failed to spawn streaming thread: {e}")))?
        };

        info!(profile = profile.name(), "Trajectory streamer started");
        Ok(Self {
            motion,
            ctx,
            profile,
            converters: Mutex::new(converters),
            group_ids,
            limits,
            events: rx,
            thread: Some(thread),
        })
    }

    /// 从配置创建驱动（TCP 连接到配置的控制器地址）
    pub fn from_config(
        config: &crate::config::DriverConfig,
        profile: Arc<dyn ControllerProfile>,
    ) -> Result<Self, DriverError> {
        let conn = moto_net::tcp::TcpMessageConnection::new(config.endpoint());
        Self::new(
            Box::new(conn),
            config.robot_groups(),
            config.velocity_limits.clone(),
            profile,
            config.streamer.to_streamer_config(),
        )
    }

    /// 运动模式控制器（就绪查询、工具切换等低层命令）
    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    /// 当前传输状态
    pub fn transfer_state(&self) -> TransferState {
        self.ctx.state.load()
    }

    /// 剩余未确认的点数
    pub fn pending_points(&self) -> Result<usize, DriverError> {
        Ok(self
            .ctx
            .buffer
            .lock()
            .map_err(|_| DriverError::PoisonedLock)?
            .pending())
    }

    /// 流式事件接收端（可克隆，跨线程消费）
    pub fn events(&self) -> Receiver<StreamEvent> {
        self.events.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.motion
            .connection()
            .lock()
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }

    /// 提交一条完整轨迹
    ///
    /// 预检 → 校验 → 整条转换 → 装载缓冲。任一阶段失败都不会发出
    /// 任何轨迹点。空轨迹等价于 [`Self::stop`]。
    pub fn submit(&self, traj: &Trajectory) -> Result<(), DriverError> {
        if traj.is_empty() {
            info!("Empty trajectory received, canceling current motion");
            return self.stop();
        }

        self.profile.preflight(&self.motion)?;
        self.profile
            .validate(traj, &self.limits, &|id| self.ctx.pose(id))?;

        let mut converters = self.converters.lock().map_err(|_| DriverError::PoisonedLock)?;
        for conv in converters.values_mut() {
            conv.reset();
        }

        let mut messages = Vec::with_capacity(traj.points.len());
        for (i, point) in traj.points.iter().enumerate() {
            let converted = convert_point(&mut converters, &traj.joint_names, point)?;
            messages.push(self.profile.create_message(i as i32, &converted)?);
        }

        let mut buf = self.ctx.buffer.lock().map_err(|_| DriverError::PoisonedLock)?;
        buf.load_trajectory(messages);
        self.ctx.state.store(TransferState::Streaming);
        info!(points = traj.points.len(), "Trajectory loaded for streaming");
        Ok(())
    }

    /// 逐点流式：把单个点加入待发队列
    ///
    /// 首个点开启逐点会话（覆盖进行中的整轨传输）；队列持续为空
    /// 超过配置的超时后会话自动结束。
    pub fn stream_point(
        &self,
        joint_names: &[String],
        point: &TrajectoryPoint,
    ) -> Result<(), DriverError> {
        let mut converters = self.converters.lock().map_err(|_| DriverError::PoisonedLock)?;
        let mut buf = self.ctx.buffer.lock().map_err(|_| DriverError::PoisonedLock)?;

        if self.ctx.state.load() != TransferState::PointStreaming {
            buf.clear();
            buf.next_point_seq = 0;
            for conv in converters.values_mut() {
                conv.reset();
            }
            self.ctx.state.store(TransferState::PointStreaming);
            info!("Point streaming session started");
        }

        let seq = buf.next_point_seq;
        let converted = convert_point(&mut converters, joint_names, point)?;
        let message = self.profile.create_message(seq, &converted)?;
        buf.next_point_seq += 1;
        buf.point_queue.push_back(message);
        buf.last_point_at = Some(std::time::Instant::now());
        Ok(())
    }

    /// 停止：清空本地缓冲并命令控制器停止运动
    pub fn stop(&self) -> Result<(), DriverError> {
        {
            let mut buf = self.ctx.buffer.lock().map_err(|_| DriverError::PoisonedLock)?;
            buf.clear();
            self.ctx.state.store(TransferState::Idle);
        }
        if let Ok(mut converters) = self.converters.lock() {
            for conv in converters.values_mut() {
                conv.reset();
            }
        }

        for msg in self.profile.stop_messages(&self.group_ids) {
            self.send_command(&msg)?;
        }
        info!("Streaming stopped");
        Ok(())
    }

    /// 进入轨迹执行模式（控制器独占）
    pub fn enable(&self) -> Result<(), DriverError> {
        self.motion.set_traj_mode(true)
    }

    /// 停止运动并退出轨迹执行模式
    pub fn disable(&self) -> Result<(), DriverError> {
        self.stop()?;
        self.motion.set_traj_mode(false)
    }

    /// 切换指定组的工具文件
    pub fn select_tool(&self, group_id: i32, tool: i32) -> Result<(), DriverError> {
        if !self.group_ids.contains(&group_id) {
            return Err(DriverError::UnknownGroup(group_id));
        }
        self.motion.select_tool(group_id, tool)
    }

    /// 更新某组的当前关节状态（严格校验的位姿来源）
    pub fn update_joint_state(
        &self,
        group_id: i32,
        names: Vec<String>,
        positions: Vec<f64>,
    ) -> Result<(), DriverError> {
        if names.len() != positions.len() {
            return Err(DriverError::Validation(format!(
                "Joint state for group {group_id} has {} names but {} positions",
                names.len(),
                positions.len()
            )));
        }
        let slot = self
            .ctx
            .poses
            .get(&group_id)
            .ok_or(DriverError::UnknownGroup(group_id))?;
        slot.store(Some(Arc::new(crate::types::PoseSample::new(
            names, positions,
        ))));
        Ok(())
    }

    /// 通过共享连接发送一条命令帧并检查回复
    fn send_command(&self, msg: &SimpleMessage) -> Result<(), DriverError> {
        let mut conn = self
            .motion
            .connection()
            .lock()
            .map_err(|_| DriverError::PoisonedLock)?;
        if !conn.is_connected() {
            conn.connect()?;
        }
        let reply = conn.send_and_receive(msg)?;
        match self.profile.classify_reply(&reply) {
            ReplyDisposition::Abort(reason) => Err(DriverError::ControllerFault(reason)),
            _ => Ok(()),
        }
    }

}

impl Drop for TrajectoryStreamer {
    fn drop(&mut self) {
        self.ctx.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // 线程回收后连接无竞争，做控制器侧善后
        self.profile.on_shutdown(&self.motion);
    }
}

/// 把一个轨迹点的全部组路标转换为数值点
fn convert_point(
    converters: &mut HashMap<i32, PointConverter>,
    joint_names: &[String],
    point: &TrajectoryPoint,
) -> Result<Vec<ConvertedPoint>, DriverError> {
    point
        .groups
        .iter()
        .map(|wp| {
            let conv = converters
                .get_mut(&wp.group_id)
                .ok_or(DriverError::UnknownGroup(wp.group_id))?;
            conv.convert(joint_names, wp)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{GenericProfile, MotoProfile};
    use crate::types::GroupWaypoint;
    use moto_net::mock::{MockConnection, MockHandle};
    use moto_protocol::{MessageBody, MotionCtrlCmd};
    use std::time::Duration;

    fn fast_config() -> StreamerConfig {
        StreamerConfig {
            loop_period: Duration::from_millis(1),
            idle_period: Duration::from_millis(2),
            reconnect_settle: Duration::from_millis(1),
            reconnect_budget: 5,
            point_stream_timeout: Duration::from_millis(100),
        }
    }

    fn joint_names() -> Vec<String> {
        vec!["j1".to_string(), "j2".to_string()]
    }

    fn make_driver(profile: Arc<dyn ControllerProfile>) -> (TrajectoryStreamer, MockHandle) {
        let (conn, handle) = MockConnection::new();
        let groups = vec![RobotGroup::new(0, "manipulator", "", joint_names())];
        let driver = TrajectoryStreamer::new(
            Box::new(conn),
            groups,
            VelocityLimits::new(),
            profile,
            fast_config(),
        )
        .unwrap();
        (driver, handle)
    }

    fn two_point_traj() -> Trajectory {
        Trajectory::new(
            joint_names(),
            vec![
                TrajectoryPoint::single(GroupWaypoint {
                    group_id: 0,
                    positions: vec![0.0, 0.0],
                    velocities: vec![0.1, 0.1],
                    accelerations: Vec::new(),
                    time_from_start: 0.0,
                }),
                TrajectoryPoint::single(GroupWaypoint {
                    group_id: 0,
                    positions: vec![0.5, 0.5],
                    velocities: vec![0.1, 0.1],
                    accelerations: Vec::new(),
                    time_from_start: 1.0,
                }),
            ],
        )
    }

    fn wait_for(events: &Receiver<StreamEvent>, pred: impl Fn(&StreamEvent) -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let event = events
                .recv_timeout(remaining)
                .expect("timed out waiting for stream event");
            if pred(&event) {
                return;
            }
        }
    }

    #[test]
    fn test_submit_streams_all_points() {
        let (driver, handle) = make_driver(Arc::new(MotoProfile));
        driver.update_joint_state(0, joint_names(), vec![0.0, 0.0]).unwrap();
        let events = driver.events();
        driver.submit(&two_point_traj()).unwrap();
        wait_for(&events, |e| *e == StreamEvent::TrajectoryComplete);
        assert_eq!(driver.transfer_state(), TransferState::Idle);

        // 预检 1 条 + 轨迹点 2 条
        let sent = handle.sent();
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0].body, MessageBody::MotionCtrl(c)
            if c.command == MotionCtrlCmd::CheckMotionReady));
        assert!(matches!(&sent[1].body, MessageBody::JointTrajPtFull(pt) if pt.seq == 0));
        assert!(matches!(&sent[2].body, MessageBody::JointTrajPtFull(pt) if pt.seq == 1));
    }

    #[test]
    fn test_submit_rejected_without_pose_sends_nothing() {
        let (driver, handle) = make_driver(Arc::new(MotoProfile));
        let err = driver.submit(&two_point_traj()).unwrap_err();
        assert!(matches!(err, DriverError::Validation(_)));
        // 预检已发送，但没有任何轨迹点出门
        assert!(
            handle
                .sent()
                .iter()
                .all(|m| matches!(&m.body, MessageBody::MotionCtrl(_)))
        );
        assert_eq!(driver.transfer_state(), TransferState::Idle);
    }

    #[test]
    fn test_empty_trajectory_stops() {
        let (driver, handle) = make_driver(Arc::new(MotoProfile));
        driver.submit(&Trajectory::stop()).unwrap();
        let sent = handle.sent();
        assert!(sent.iter().any(|m| matches!(&m.body, MessageBody::MotionCtrl(c)
            if c.command == MotionCtrlCmd::StopMotion)));
        assert_eq!(driver.transfer_state(), TransferState::Idle);
    }

    #[test]
    fn test_unknown_group_rejected() {
        let (driver, _handle) = make_driver(Arc::new(GenericProfile));
        let traj = Trajectory::new(
            joint_names(),
            vec![TrajectoryPoint::single(GroupWaypoint::positions_only(
                9,
                vec![0.0, 0.0],
                0.0,
            ))],
        );
        let err = driver.submit(&traj).unwrap_err();
        assert!(matches!(err, DriverError::UnknownGroup(9)));
    }

    #[test]
    fn test_generic_profile_skips_pose_check() {
        // 通用档位不要求位姿，无位姿也能提交
        let (driver, _handle) = make_driver(Arc::new(GenericProfile));
        let events = driver.events();
        driver.submit(&two_point_traj()).unwrap();
        wait_for(&events, |e| *e == StreamEvent::TrajectoryComplete);
    }

    #[test]
    fn test_stream_point_session() {
        let (driver, _handle) = make_driver(Arc::new(MotoProfile));
        let events = driver.events();
        let point = TrajectoryPoint::single(GroupWaypoint {
            group_id: 0,
            positions: vec![0.1, 0.2],
            velocities: vec![0.0, 0.0],
            accelerations: Vec::new(),
            time_from_start: 0.5,
        });
        driver.stream_point(&joint_names(), &point).unwrap();
        assert_eq!(driver.transfer_state(), TransferState::PointStreaming);
        wait_for(&events, |e| matches!(e, StreamEvent::PointAcked { seq: 0 }));
        wait_for(&events, |e| *e == StreamEvent::PointSessionTimeout);
        assert_eq!(driver.transfer_state(), TransferState::Idle);
    }

    #[test]
    fn test_update_joint_state_misaligned_rejected() {
        let (driver, _handle) = make_driver(Arc::new(MotoProfile));
        let err = driver
            .update_joint_state(0, joint_names(), vec![0.0])
            .unwrap_err();
        assert!(matches!(err, DriverError::Validation(msg) if msg.contains("names")));
        // 被拒绝的采样不得进入位姿缓存
        let err = driver.submit(&two_point_traj()).unwrap_err();
        assert!(matches!(err, DriverError::Validation(msg) if msg.contains("No current joint state")));
    }

    #[test]
    fn test_select_tool_unknown_group() {
        let (driver, _handle) = make_driver(Arc::new(MotoProfile));
        assert!(matches!(
            driver.select_tool(3, 1).unwrap_err(),
            DriverError::UnknownGroup(3)
        ));
    }

    #[test]
    fn test_drop_shuts_down_controller() {
        let (driver, handle) = make_driver(Arc::new(MotoProfile));
        drop(driver);
        let cmds: Vec<MotionCtrlCmd> = handle
            .sent()
            .iter()
            .filter_map(|m| match &m.body {
                MessageBody::MotionCtrl(c) => Some(c.command),
                _ => None,
            })
            .collect();
        assert!(cmds.contains(&MotionCtrlCmd::StopMotion));
        assert!(cmds.contains(&MotionCtrlCmd::StopTrajMode));
    }

    #[test]
    fn test_duplicate_group_ids_rejected() {
        let (conn, _handle) = MockConnection::new();
        let groups = vec![
            RobotGroup::new(0, "a", "", joint_names()),
            RobotGroup::new(0, "b", "", joint_names()),
        ];
        let err = TrajectoryStreamer::new(
            Box::new(conn),
            groups,
            VelocityLimits::new(),
            Arc::new(MotoProfile),
            fast_config(),
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }
}
