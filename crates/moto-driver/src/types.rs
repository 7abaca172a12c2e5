//! 轨迹与运动组数据模型
//!
//! 单组与多组控制器统一为"每个轨迹点携带 1-N 个命名运动组"的表示，
//! 单组只是 N=1 的特例。

use std::collections::HashMap;
use std::time::Instant;

use moto_protocol::MAX_NUM_GROUPS;
use smallvec::SmallVec;

/// 关节名 → 最大绝对速度（rad/s）
///
/// 缺失条目表示该关节不做限速校验，而不是配置错误。
pub type VelocityLimits = HashMap<String, f64>;

/// 一个可独立寻址的运动组（如多臂控制器上的一条机械臂）
///
/// 配置加载后不可变。`joint_names` 是机器人侧的规范关节顺序，
/// 允许空字符串槽位（dummy 关节：物理轴未使用或虚拟轴）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotGroup {
    group_id: i32,
    name: String,
    ns: String,
    joint_names: Vec<String>,
}

impl RobotGroup {
    pub fn new(
        group_id: i32,
        name: impl Into<String>,
        ns: impl Into<String>,
        joint_names: Vec<String>,
    ) -> Self {
        Self {
            group_id,
            name: name.into(),
            ns: ns.into(),
            joint_names,
        }
    }

    pub fn group_id(&self) -> i32 {
        self.group_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// 规范关节顺序（可能含空槽位）
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// 规范槽位数量（含 dummy）
    pub fn num_joints(&self) -> usize {
        self.joint_names.len()
    }
}

/// 单个运动组在某个轨迹点上的路标数据
///
/// `velocities` / `accelerations` 为空即"未提供"；非空时长度必须
/// 等于 `positions`。
#[derive(Debug, Clone, PartialEq)]
pub struct GroupWaypoint {
    /// 目标运动组编号
    pub group_id: i32,
    /// 关节位置（弧度），按轨迹的 joint_names 顺序对齐
    pub positions: Vec<f64>,
    /// 关节速度（rad/s），可为空
    pub velocities: Vec<f64>,
    /// 关节加速度，可为空
    pub accelerations: Vec<f64>,
    /// 距轨迹起点的时间偏移（秒）
    pub time_from_start: f64,
}

impl GroupWaypoint {
    /// 仅携带位置的路标
    pub fn positions_only(group_id: i32, positions: Vec<f64>, time_from_start: f64) -> Self {
        Self {
            group_id,
            positions,
            velocities: Vec::new(),
            accelerations: Vec::new(),
            time_from_start,
        }
    }
}

/// 一个轨迹点：1-4 个运动组的路标集合
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub groups: SmallVec<[GroupWaypoint; MAX_NUM_GROUPS]>,
}

impl TrajectoryPoint {
    pub fn new(groups: impl IntoIterator<Item = GroupWaypoint>) -> Self {
        Self {
            groups: groups.into_iter().collect(),
        }
    }

    /// 单组轨迹点
    pub fn single(waypoint: GroupWaypoint) -> Self {
        Self::new([waypoint])
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
}

/// 一条运动轨迹
///
/// 空轨迹（`points` 为空）是规范的"停止"命令，不是错误。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    /// 输入侧的关节名顺序（所有组共用同一个名字表）
    pub joint_names: Vec<String>,
    /// 轨迹点序列
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn new(joint_names: Vec<String>, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            joint_names,
            points,
        }
    }

    /// 空轨迹 = 停止命令
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 最近一次收到的某组关节状态采样
///
/// 由反馈侧异步更新，每组 last-value-wins；时效性按"距上次更新的
/// 时长"衡量，与消息序号无关。
#[derive(Debug, Clone)]
pub struct PoseSample {
    /// 采样中的关节名
    pub names: Vec<String>,
    /// 对应位置（弧度）
    pub positions: Vec<f64>,
    /// 本地接收时刻
    pub received_at: Instant,
}

impl PoseSample {
    pub fn new(names: Vec<String>, positions: Vec<f64>) -> Self {
        Self {
            names,
            positions,
            received_at: Instant::now(),
        }
    }

    /// 距上次更新的时长
    pub fn age(&self) -> std::time::Duration {
        self.received_at.elapsed()
    }
}
