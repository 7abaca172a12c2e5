//! 轨迹预校验
//!
//! 在任何字节发出之前同步拒绝不合法的轨迹。基础校验适用于所有
//! 控制器档位；严格校验补充实时控制器的额外要求（速度必备、
//! 当前位姿新鲜且与轨迹起点一致）。

use std::sync::Arc;
use std::time::Duration;

use crate::error::DriverError;
use crate::types::{PoseSample, Trajectory, VelocityLimits};

/// 关节状态采样的最大可用时长
pub const POS_STALE_TIME: Duration = Duration::from_secs(1);

/// 轨迹起点与当前位姿的逐关节容差（弧度）
pub const START_POS_TOL: f64 = 1e-4;

/// 基础校验：结构完整性、限速、时间戳单调性
///
/// 限速校验按关节名查表；没有限速条目的关节跳过（配置决定校验
/// 范围，不在此处报错）。
pub fn validate_base(traj: &Trajectory, limits: &VelocityLimits) -> Result<(), DriverError> {
    for (i, point) in traj.points.iter().enumerate() {
        if point.groups.is_empty() {
            return Err(DriverError::Validation(format!(
                "Trajectory pt {i} has no group data"
            )));
        }
        for wp in &point.groups {
            if wp.positions.is_empty() {
                return Err(DriverError::Validation(format!(
                    "Trajectory pt {i} (group {}) has no position data",
                    wp.group_id
                )));
            }
            // 路标数组必须与轨迹的关节名表逐槽对齐
            if wp.positions.len() != traj.joint_names.len() {
                return Err(DriverError::Validation(format!(
                    "Trajectory pt {i} (group {}) has {} positions for {} joint names",
                    wp.group_id,
                    wp.positions.len(),
                    traj.joint_names.len()
                )));
            }
            if !wp.velocities.is_empty() && wp.velocities.len() != wp.positions.len() {
                return Err(DriverError::Validation(format!(
                    "Trajectory pt {i} (group {}) velocity length mismatch",
                    wp.group_id
                )));
            }
            if !wp.accelerations.is_empty() && wp.accelerations.len() != wp.positions.len() {
                return Err(DriverError::Validation(format!(
                    "Trajectory pt {i} (group {}) acceleration length mismatch",
                    wp.group_id
                )));
            }
            if !wp.velocities.is_empty() {
                check_velocity_limits(i, &traj.joint_names, &wp.velocities, limits)?;
            }
            // 首点允许 t=0，后续点必须有正的时间偏移
            if i > 0 && wp.time_from_start <= 0.0 {
                return Err(DriverError::Validation(format!(
                    "Trajectory pt {i} (group {}) has non-positive time_from_start",
                    wp.group_id
                )));
            }
        }
    }
    Ok(())
}

/// 严格校验：每个点必须带速度，且轨迹起点必须与新鲜的当前位姿一致
///
/// `pose` 按组编号返回最近一次关节状态采样。采样缺失或距上次更新
/// 超过 [`POS_STALE_TIME`] 都视为过期。
pub fn validate_strict(
    traj: &Trajectory,
    pose: impl Fn(i32) -> Option<Arc<PoseSample>>,
) -> Result<(), DriverError> {
    for (i, point) in traj.points.iter().enumerate() {
        for wp in &point.groups {
            if wp.velocities.is_empty() {
                return Err(DriverError::Validation(format!(
                    "Missing velocity data for trajectory pt {i} (group {})",
                    wp.group_id
                )));
            }
        }
    }

    let Some(first) = traj.points.first() else {
        return Ok(());
    };
    for wp in &first.groups {
        let sample = pose(wp.group_id).ok_or_else(|| {
            DriverError::Validation(format!(
                "No current joint state received for group {}",
                wp.group_id
            ))
        })?;
        if sample.age() > POS_STALE_TIME {
            return Err(DriverError::Validation(format!(
                "Current joint state for group {} is stale ({:.2} s old)",
                wp.group_id,
                sample.age().as_secs_f64()
            )));
        }
        check_start_pose(&traj.joint_names, &wp.positions, wp.group_id, &sample)?;
    }
    Ok(())
}

fn check_velocity_limits(
    pt_index: usize,
    joint_names: &[String],
    velocities: &[f64],
    limits: &VelocityLimits,
) -> Result<(), DriverError> {
    for (name, &vel) in joint_names.iter().zip(velocities) {
        let Some(&limit) = limits.get(name) else {
            continue;
        };
        if vel.abs() > limit {
            return Err(DriverError::Validation(format!(
                "Trajectory pt {pt_index} exceeds velocity limit for joint '{name}' \
                 ({:.4} > {:.4})",
                vel.abs(),
                limit
            )));
        }
    }
    Ok(())
}

/// 逐关节比较轨迹起点与当前位姿（按名字匹配，顺序无关）
fn check_start_pose(
    joint_names: &[String],
    positions: &[f64],
    group_id: i32,
    sample: &PoseSample,
) -> Result<(), DriverError> {
    for (name, &target) in joint_names.iter().zip(positions) {
        let Some(idx) = sample.names.iter().position(|n| n == name) else {
            continue;
        };
        // 采样自身可能不完整（名多于值），缺值的关节视为无匹配
        let Some(&current) = sample.positions.get(idx) else {
            continue;
        };
        if !is_within_range(target, current, START_POS_TOL) {
            return Err(DriverError::Validation(format!(
                "Trajectory start position doesn't match current robot position \
                 (group {group_id}, joint '{name}': {target:.6} vs {current:.6})"
            )));
        }
    }
    Ok(())
}

fn is_within_range(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}
