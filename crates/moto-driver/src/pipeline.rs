//! 轨迹点转换流水线
//!
//! 把输入侧的命名轨迹点转换为机器人规范顺序的数值点：
//! 选择重排 → 坐标变换 → 速度比计算 → 时长计算。每个运动组持有
//! 一个 [`PointConverter`]，跨点状态只有 `last_time` 一项。

use std::sync::Arc;

use tracing::warn;

use crate::error::DriverError;
use crate::types::{GroupWaypoint, RobotGroup, VelocityLimits};

/// 输入未提供速度比时的默认值
pub const DEFAULT_VEL_RATIO: f64 = 0.1;

/// 无法推导时长时的默认段时长（秒）
pub const DEFAULT_DURATION: f64 = 10.0;

/// dummy 关节槽位的默认位置
pub const DEFAULT_JOINT_POS: f64 = 0.0;

/// dummy 关节槽位在速度 / 加速度上的占位哨兵，下游按"不可用"处理
pub const UNUSED_SENTINEL: f64 = -1.0;

/// 按机器人规范顺序重排后的轨迹点
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPoint {
    /// 规范顺序的位置
    pub positions: Vec<f64>,
    /// 规范顺序的速度（输入未提供时为空）
    pub velocities: Vec<f64>,
    /// 规范顺序的加速度（输入未提供时为空）
    pub accelerations: Vec<f64>,
    /// 距轨迹起点的时间偏移
    pub time_from_start: f64,
}

/// 转换流水线的最终产物
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedPoint {
    /// 目标运动组编号
    pub group_id: i32,
    /// 重排 + 变换后的点
    pub selected: SelectedPoint,
    /// 归一化速度比 [0, 1]
    pub velocity_ratio: f64,
    /// 本段时长（秒）
    pub duration: f64,
}

/// 选择重排后的逐点坐标变换钩子
///
/// 默认恒等。需要坐标系修正（如轴耦合补偿）的控制器实现本 trait。
pub trait JointTransform: Send + Sync {
    /// 就地修正一个已按规范顺序排列的点
    fn transform(&self, point: &mut SelectedPoint) -> Result<(), DriverError>;
}

/// 恒等变换
pub struct IdentityTransform;

impl JointTransform for IdentityTransform {
    fn transform(&self, _point: &mut SelectedPoint) -> Result<(), DriverError> {
        Ok(())
    }
}

/// 单个运动组的轨迹点转换器
pub struct PointConverter {
    group: RobotGroup,
    limits: VelocityLimits,
    transform: Arc<dyn JointTransform>,
    /// 上一个点的时间偏移，用于推导段时长
    last_time: f64,
}

impl PointConverter {
    pub fn new(group: RobotGroup, limits: VelocityLimits, transform: Arc<dyn JointTransform>) -> Self {
        Self {
            group,
            limits,
            transform,
            last_time: 0.0,
        }
    }

    pub fn group(&self) -> &RobotGroup {
        &self.group
    }

    /// 新命令开始时复位跨点状态
    pub fn reset(&mut self) {
        self.last_time = 0.0;
    }

    /// 完整流水线：选择重排 → 变换 → 速度比 → 时长
    pub fn convert(
        &mut self,
        joint_names: &[String],
        waypoint: &GroupWaypoint,
    ) -> Result<ConvertedPoint, DriverError> {
        let mut selected = self.select(joint_names, waypoint)?;
        self.transform.transform(&mut selected)?;
        let velocity_ratio = self.calc_velocity(&selected);
        let duration = self.calc_duration(&selected);
        Ok(ConvertedPoint {
            group_id: self.group.group_id(),
            selected,
            velocity_ratio,
            duration,
        })
    }

    /// 按机器人规范关节顺序重排输入点
    ///
    /// 输入数组必须与 `joint_names` 等长对齐（速度 / 加速度为空除外），
    /// 否则拒绝。dummy 槽位（规范名为空串）填默认位置和哨兵速度 /
    /// 加速度；非空规范名在输入中找不到则整条命令失败。速度 / 加速度
    /// 按"全有或全无"处理：输入未提供则输出也不提供。
    pub fn select(
        &self,
        joint_names: &[String],
        waypoint: &GroupWaypoint,
    ) -> Result<SelectedPoint, DriverError> {
        let canonical = self.group.joint_names();
        let has_vel = !waypoint.velocities.is_empty();
        let has_acc = !waypoint.accelerations.is_empty();

        if waypoint.positions.len() != joint_names.len()
            || (has_vel && waypoint.velocities.len() != joint_names.len())
            || (has_acc && waypoint.accelerations.len() != joint_names.len())
        {
            return Err(DriverError::Validation(format!(
                "Waypoint for group {} is not aligned with the {} input joint names",
                waypoint.group_id,
                joint_names.len()
            )));
        }

        let mut positions = Vec::with_capacity(canonical.len());
        let mut velocities = if has_vel {
            Vec::with_capacity(canonical.len())
        } else {
            Vec::new()
        };
        let mut accelerations = if has_acc {
            Vec::with_capacity(canonical.len())
        } else {
            Vec::new()
        };

        for name in canonical {
            if name.is_empty() {
                // dummy 关节：没有对应输入
                positions.push(DEFAULT_JOINT_POS);
                if has_vel {
                    velocities.push(UNUSED_SENTINEL);
                }
                if has_acc {
                    accelerations.push(UNUSED_SENTINEL);
                }
                continue;
            }
            let idx = joint_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| DriverError::JointNotFound(name.clone()))?;
            positions.push(waypoint.positions[idx]);
            if has_vel {
                velocities.push(waypoint.velocities[idx]);
            }
            if has_acc {
                accelerations.push(waypoint.accelerations[idx]);
            }
        }

        Ok(SelectedPoint {
            positions,
            velocities,
            accelerations,
            time_from_start: waypoint.time_from_start,
        })
    }

    /// 由关节速度推导归一化速度比
    ///
    /// 取各可用关节 |v| / limit 的最大值（"关键关节"决定整体速度）。
    /// 无速度数据或无任何可用限速时退回默认比。结果夹紧到 [0, 1]。
    pub fn calc_velocity(&self, point: &SelectedPoint) -> f64 {
        if point.velocities.is_empty() {
            return DEFAULT_VEL_RATIO;
        }

        let mut ratio: Option<f64> = None;
        for (name, &vel) in self.group.joint_names().iter().zip(&point.velocities) {
            if name.is_empty() {
                continue;
            }
            let Some(&limit) = self.limits.get(name) else {
                continue;
            };
            if limit <= 0.0 {
                continue;
            }
            let r = vel.abs() / limit;
            ratio = Some(match ratio {
                Some(prev) => prev.max(r),
                None => r,
            });
        }

        let ratio = ratio.unwrap_or(DEFAULT_VEL_RATIO);
        if !(0.0..=1.0).contains(&ratio) {
            warn!(
                group_id = self.group.group_id(),
                ratio, "Velocity ratio out of range, clipping to [0, 1]"
            );
            return ratio.clamp(0.0, 1.0);
        }
        ratio
    }

    /// 由相邻点的时间偏移之差推导段时长
    ///
    /// 时间偏移必须严格递增，否则退回默认时长。无论哪个分支都会
    /// 推进 `last_time`，保证后续点以本点为基准。
    pub fn calc_duration(&mut self, point: &SelectedPoint) -> f64 {
        let duration = if point.time_from_start > self.last_time {
            point.time_from_start - self.last_time
        } else {
            DEFAULT_DURATION
        };
        self.last_time = point.time_from_start;
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_group(names: &[&str]) -> RobotGroup {
        RobotGroup::new(
            0,
            "manipulator",
            "",
            names.iter().map(|n| n.to_string()).collect(),
        )
    }

    fn make_converter(names: &[&str], limits: &[(&str, f64)]) -> PointConverter {
        let limits: HashMap<String, f64> = limits
            .iter()
            .map(|(n, v)| (n.to_string(), *v))
            .collect();
        PointConverter::new(make_group(names), limits, Arc::new(IdentityTransform))
    }

    #[test]
    fn test_select_reorders_by_canonical_names() {
        let conv = make_converter(&["j1", "j2", "j3"], &[]);
        let names = vec!["j3".to_string(), "j1".to_string(), "j2".to_string()];
        let wp = GroupWaypoint::positions_only(0, vec![3.0, 1.0, 2.0], 0.5);
        let selected = conv.select(&names, &wp).unwrap();
        assert_eq!(selected.positions, vec![1.0, 2.0, 3.0]);
        assert!(selected.velocities.is_empty());
    }

    #[test]
    fn test_select_missing_joint_fails() {
        let conv = make_converter(&["j1", "j2"], &[]);
        let names = vec!["j1".to_string()];
        let wp = GroupWaypoint::positions_only(0, vec![1.0], 0.0);
        let err = conv.select(&names, &wp).unwrap_err();
        assert!(matches!(err, DriverError::JointNotFound(name) if name == "j2"));
    }

    #[test]
    fn test_select_rejects_misaligned_waypoint() {
        // 位置数组比输入关节名短：拒绝而不是越界
        let conv = make_converter(&["j1", "j2"], &[]);
        let names = vec!["j1".to_string(), "j2".to_string()];
        let wp = GroupWaypoint::positions_only(0, vec![1.0], 0.0);
        let err = conv.select(&names, &wp).unwrap_err();
        assert!(matches!(err, DriverError::Validation(msg) if msg.contains("not aligned")));

        // 速度数组长度不符同样拒绝
        let wp = GroupWaypoint {
            group_id: 0,
            positions: vec![1.0, 2.0],
            velocities: vec![0.1],
            accelerations: Vec::new(),
            time_from_start: 0.0,
        };
        assert!(conv.select(&names, &wp).is_err());
    }

    #[test]
    fn test_select_dummy_slot_defaults() {
        // 规范名为空串的槽位是 dummy 关节
        let conv = make_converter(&["j1", "", "j2"], &[]);
        let names = vec!["j1".to_string(), "j2".to_string()];
        let wp = GroupWaypoint {
            group_id: 0,
            positions: vec![1.0, 2.0],
            velocities: vec![0.1, 0.2],
            accelerations: vec![0.01, 0.02],
            time_from_start: 0.0,
        };
        let selected = conv.select(&names, &wp).unwrap();
        assert_eq!(selected.positions, vec![1.0, DEFAULT_JOINT_POS, 2.0]);
        assert_eq!(selected.velocities, vec![0.1, UNUSED_SENTINEL, 0.2]);
        assert_eq!(selected.accelerations, vec![0.01, UNUSED_SENTINEL, 0.02]);
    }

    #[test]
    fn test_select_six_axis_with_dummy_elbow() {
        // 6 槽位规范顺序，第 4 槽是 dummy：输入只提供 5 个真实关节
        let conv = make_converter(&["j1", "j2", "j3", "", "j5", "j6"], &[]);
        let names: Vec<String> = ["j5", "j1", "j6", "j2", "j3"]
            .iter()
            .map(|n| n.to_string())
            .collect();
        let wp = GroupWaypoint::positions_only(0, vec![5.0, 1.0, 6.0, 2.0, 3.0], 1.0);
        let selected = conv.select(&names, &wp).unwrap();
        assert_eq!(
            selected.positions,
            vec![1.0, 2.0, 3.0, DEFAULT_JOINT_POS, 5.0, 6.0]
        );
    }

    #[test]
    fn test_calc_velocity_critical_joint() {
        let conv = make_converter(&["j1", "j2"], &[("j1", 2.0), ("j2", 1.0)]);
        let point = SelectedPoint {
            positions: vec![0.0, 0.0],
            velocities: vec![-1.0, 0.3],
            accelerations: Vec::new(),
            time_from_start: 0.0,
        };
        // j1: 1.0/2.0 = 0.5, j2: 0.3/1.0 = 0.3 → 0.5
        assert!((conv.calc_velocity(&point) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_calc_velocity_defaults_without_data() {
        let conv = make_converter(&["j1"], &[("j1", 1.0)]);
        let no_vel = SelectedPoint {
            positions: vec![0.0],
            velocities: Vec::new(),
            accelerations: Vec::new(),
            time_from_start: 0.0,
        };
        assert_eq!(conv.calc_velocity(&no_vel), DEFAULT_VEL_RATIO);

        // 有速度但没有任何限速配置，同样退回默认
        let conv = make_converter(&["j1"], &[]);
        let with_vel = SelectedPoint {
            positions: vec![0.0],
            velocities: vec![5.0],
            accelerations: Vec::new(),
            time_from_start: 0.0,
        };
        assert_eq!(conv.calc_velocity(&with_vel), DEFAULT_VEL_RATIO);
    }

    #[test]
    fn test_calc_velocity_clips_over_limit() {
        let conv = make_converter(&["j1"], &[("j1", 1.0)]);
        let point = SelectedPoint {
            positions: vec![0.0],
            velocities: vec![3.0],
            accelerations: Vec::new(),
            time_from_start: 0.0,
        };
        assert_eq!(conv.calc_velocity(&point), 1.0);
    }

    #[test]
    fn test_calc_duration_deltas() {
        let mut conv = make_converter(&["j1"], &[]);
        let mut point = SelectedPoint {
            positions: vec![0.0],
            velocities: Vec::new(),
            accelerations: Vec::new(),
            time_from_start: 0.5,
        };
        assert!((conv.calc_duration(&point) - 0.5).abs() < 1e-12);
        point.time_from_start = 1.25;
        assert!((conv.calc_duration(&point) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_calc_duration_non_increasing_falls_back() {
        let mut conv = make_converter(&["j1"], &[]);
        let mut point = SelectedPoint {
            positions: vec![0.0],
            velocities: Vec::new(),
            accelerations: Vec::new(),
            time_from_start: 2.0,
        };
        conv.calc_duration(&point);
        // 时间回退：退回默认，但 last_time 仍推进
        point.time_from_start = 1.0;
        assert_eq!(conv.calc_duration(&point), DEFAULT_DURATION);
        point.time_from_start = 1.5;
        assert!((conv.calc_duration(&point) - 0.5).abs() < 1e-12);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // 无论输入速度和限速如何，速度比都落在 [0, 1]
            #[test]
            fn velocity_ratio_always_normalized(
                vels in proptest::collection::vec(-100.0f64..100.0, 3),
                limits in proptest::collection::vec(0.1f64..10.0, 3),
            ) {
                let limit_map = [("j1", limits[0]), ("j2", limits[1]), ("j3", limits[2])]
                    .into_iter()
                    .map(|(n, v)| (n.to_string(), v))
                    .collect();
                let conv = PointConverter::new(
                    make_group(&["j1", "j2", "j3"]),
                    limit_map,
                    Arc::new(IdentityTransform),
                );
                let point = SelectedPoint {
                    positions: vec![0.0; 3],
                    velocities: vels,
                    accelerations: Vec::new(),
                    time_from_start: 0.0,
                };
                let ratio = conv.calc_velocity(&point);
                prop_assert!((0.0..=1.0).contains(&ratio));
            }

            // 任意时间序列（含乱序）下段时长恒为正
            #[test]
            fn duration_always_positive(
                times in proptest::collection::vec(0.0f64..1000.0, 1..20),
            ) {
                let mut conv = make_converter(&["j1"], &[]);
                for t in times {
                    let point = SelectedPoint {
                        positions: vec![0.0],
                        velocities: Vec::new(),
                        accelerations: Vec::new(),
                        time_from_start: t,
                    };
                    prop_assert!(conv.calc_duration(&point) > 0.0);
                }
            }
        }
    }

    #[test]
    fn test_reset_clears_last_time() {
        let mut conv = make_converter(&["j1"], &[]);
        let point = SelectedPoint {
            positions: vec![0.0],
            velocities: Vec::new(),
            accelerations: Vec::new(),
            time_from_start: 3.0,
        };
        conv.calc_duration(&point);
        conv.reset();
        assert!((conv.calc_duration(&point) - 3.0).abs() < 1e-12);
    }
}
