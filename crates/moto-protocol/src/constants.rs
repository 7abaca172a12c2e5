//! 协议常量定义
//!
//! 消息类型编号、特殊序列号和有效字段位。数值与控制器固件约定一致，
//! 不可随意更改。

/// 消息类型编号
pub mod msg_types {
    /// 基础轨迹点（位置 + 速度比例 + 段时长）
    pub const JOINT_TRAJ_PT: i32 = 11;
    /// 完整轨迹点（时间戳 + 位置 / 速度 / 加速度）
    pub const JOINT_TRAJ_PT_FULL: i32 = 14;
    /// 运动控制命令（厂商扩展）
    pub const MOTO_MOTION_CTRL: i32 = 2001;
    /// 运动控制回复（厂商扩展）
    pub const MOTO_MOTION_REPLY: i32 = 2002;
    /// 多组完整轨迹点（厂商扩展，最多 4 组）
    pub const MOTO_JOINT_TRAJ_PT_FULL_EX: i32 = 2016;
}

/// 特殊序列号（代替普通的点序号，向控制器传递轨迹级命令）
pub mod special_seq {
    /// 开始轨迹下载模式
    pub const START_TRAJECTORY_DOWNLOAD: i32 = -1;
    /// 开始轨迹流式模式
    pub const START_TRAJECTORY_STREAMING: i32 = -2;
    /// 轨迹结束
    pub const END_TRAJECTORY: i32 = -3;
    /// 立即停止当前轨迹
    pub const STOP_TRAJECTORY: i32 = -4;
}

/// 完整轨迹点的有效字段位掩码
pub mod valid_fields {
    pub const TIME: i32 = 0x01;
    pub const POSITION: i32 = 0x02;
    pub const VELOCITY: i32 = 0x04;
    pub const ACCELERATION: i32 = 0x08;
}

/// 单条消息可携带的最大关节数（固定线格式宽度）
pub const MAX_NUM_JOINTS: usize = 10;

/// 多组消息可携带的最大运动组数
pub const MAX_NUM_GROUPS: usize = 4;

/// 运动控制命令编号
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(i32)]
pub enum MotionCtrlCmd {
    Undefined = 0,
    /// 查询控制器是否就绪（伺服上电、无报警）
    CheckMotionReady = 200101,
    /// 查询控制器运动队列深度
    CheckQueueCnt = 200102,
    /// 立即停止运动并清空队列
    StopMotion = 200111,
    /// 切换指定组的工具文件
    SelectTool = 200120,
    /// 进入轨迹执行模式（独占控制器）
    StartTrajMode = 200121,
    /// 退出轨迹执行模式（释放给其他程序模式）
    StopTrajMode = 200122,
}

/// 运动回复结果码
///
/// `Busy` 不是错误：它是控制器的流控信号，表示命令有效但尚未入队，
/// 调用方应原样重发同一个点。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(i32)]
pub enum MotionReplyResult {
    Success = 0,
    Busy = 1,
    Failure = 2,
    Invalid = 3,
    Alarm = 4,
    NotReady = 5,
    MfFailure = 6,
}

/// NotReady 结果的细分子码（用于生成诊断文本）
pub mod not_ready_subcode {
    pub const UNSPECIFIED: i32 = 5000;
    pub const ALARM: i32 = 5001;
    pub const ERROR: i32 = 5002;
    pub const ESTOP: i32 = 5003;
    pub const NOT_PLAY: i32 = 5004;
    pub const NOT_REMOTE: i32 = 5005;
    pub const SERVO_OFF: i32 = 5006;
    pub const HOLD: i32 = 5007;
    pub const NOT_STARTED: i32 = 5008;
    pub const WAITING_ROS: i32 = 5009;
}
