//! 轨迹点消息
//!
//! 三种轨迹点线格式：
//!
//! - [`JointTrajPt`]: 基础格式，位置 + 整体速度比例 + 段时长
//! - [`JointTrajPtFull`]: 完整格式，时间戳 + 位置 / 速度 / 加速度 + 有效字段位
//! - [`JointTrajPtFullEx`]: 多组格式，每个点携带 1-4 个组的完整数据

use crate::{
    ByteReader, ByteWriter, JointData, MAX_NUM_GROUPS, ProtocolError, valid_fields,
};

/// 基础轨迹点
///
/// `velocity` 是整组关节的速度百分比（0.0-1.0），不是逐关节速度；
/// `duration` 是距上一个点的段时长（秒）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTrajPt {
    /// 点序号（负值为特殊序列号，见 [`crate::special_seq`]）
    pub seq: i32,
    /// 关节位置（弧度）
    pub joints: JointData,
    /// 速度比例 [0, 1]
    pub velocity: f32,
    /// 段时长（秒）
    pub duration: f32,
}

impl JointTrajPt {
    pub fn new(seq: i32, joints: JointData, velocity: f32, duration: f32) -> Self {
        Self {
            seq,
            joints,
            velocity,
            duration,
        }
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.seq);
        self.joints.write(w);
        w.write_f32(self.velocity);
        w.write_f32(self.duration);
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            seq: r.read_i32()?,
            joints: JointData::read(r)?,
            velocity: r.read_f32()?,
            duration: r.read_f32()?,
        })
    }
}

/// 完整轨迹点
///
/// 有效字段位（[`crate::valid_fields`]）声明哪些子字段有意义；
/// 无效子字段在线格式中仍然占位（全零）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTrajPtFull {
    /// 目标运动组编号
    pub robot_id: i32,
    /// 点序号
    pub seq: i32,
    /// 有效字段位掩码
    pub valid_fields: i32,
    /// 距轨迹起点的时间（秒）
    pub time: f32,
    pub positions: JointData,
    pub velocities: JointData,
    pub accelerations: JointData,
}

impl JointTrajPtFull {
    /// 构造一个仅声明时间字段有效的空点
    pub fn new(robot_id: i32, seq: i32, time: f32) -> Self {
        Self {
            robot_id,
            seq,
            valid_fields: valid_fields::TIME,
            time,
            positions: JointData::new(),
            velocities: JointData::new(),
            accelerations: JointData::new(),
        }
    }

    /// 设置位置并标记位置字段有效
    pub fn set_positions(&mut self, positions: JointData) {
        self.positions = positions;
        self.valid_fields |= valid_fields::POSITION;
    }

    /// 设置速度并标记速度字段有效
    pub fn set_velocities(&mut self, velocities: JointData) {
        self.velocities = velocities;
        self.valid_fields |= valid_fields::VELOCITY;
    }

    /// 设置加速度并标记加速度字段有效
    pub fn set_accelerations(&mut self, accelerations: JointData) {
        self.accelerations = accelerations;
        self.valid_fields |= valid_fields::ACCELERATION;
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.robot_id);
        w.write_i32(self.seq);
        w.write_i32(self.valid_fields);
        w.write_f32(self.time);
        self.positions.write(w);
        self.velocities.write(w);
        self.accelerations.write(w);
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            robot_id: r.read_i32()?,
            seq: r.read_i32()?,
            valid_fields: r.read_i32()?,
            time: r.read_f32()?,
            positions: JointData::read(r)?,
            velocities: JointData::read(r)?,
            accelerations: JointData::read(r)?,
        })
    }
}

/// 多组轨迹点中单个组的数据块
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupTrajPtData {
    /// 组编号
    pub group_id: i32,
    /// 有效字段位掩码
    pub valid_fields: i32,
    /// 距轨迹起点的时间（秒）
    pub time: f32,
    pub positions: JointData,
    pub velocities: JointData,
    pub accelerations: JointData,
}

impl GroupTrajPtData {
    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.group_id);
        w.write_i32(self.valid_fields);
        w.write_f32(self.time);
        self.positions.write(w);
        self.velocities.write(w);
        self.accelerations.write(w);
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            group_id: r.read_i32()?,
            valid_fields: r.read_i32()?,
            time: r.read_f32()?,
            positions: JointData::read(r)?,
            velocities: JointData::read(r)?,
            accelerations: JointData::read(r)?,
        })
    }
}

/// 多组完整轨迹点（1-4 个运动组）
#[derive(Debug, Clone, PartialEq)]
pub struct JointTrajPtFullEx {
    /// 点序号（所有组共用）
    pub seq: i32,
    /// 各组数据块
    pub groups: Vec<GroupTrajPtData>,
}

impl JointTrajPtFullEx {
    /// 构造多组轨迹点
    ///
    /// # 错误
    /// - `ProtocolError::TooManyGroups`: 组数量超过 4
    pub fn new(seq: i32, groups: Vec<GroupTrajPtData>) -> Result<Self, ProtocolError> {
        if groups.len() > MAX_NUM_GROUPS {
            return Err(ProtocolError::TooManyGroups {
                count: groups.len(),
                max: MAX_NUM_GROUPS,
            });
        }
        Ok(Self { seq, groups })
    }

    /// 组数量
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.groups.len() as i32);
        w.write_i32(self.seq);
        for group in &self.groups {
            group.write(w);
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let num_groups = r.read_i32()?;
        if num_groups < 0 || num_groups as usize > MAX_NUM_GROUPS {
            return Err(ProtocolError::TooManyGroups {
                count: num_groups.max(0) as usize,
                max: MAX_NUM_GROUPS,
            });
        }
        let seq = r.read_i32()?;
        let mut groups = Vec::with_capacity(num_groups as usize);
        for _ in 0..num_groups {
            groups.push(GroupTrajPtData::read(r)?);
        }
        Ok(Self { seq, groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageBody, SimpleMessage};

    fn roundtrip(msg: SimpleMessage) -> SimpleMessage {
        let buf = msg.encode();
        SimpleMessage::decode(&buf[crate::PREFIX_SIZE..]).unwrap()
    }

    #[test]
    fn test_traj_pt_roundtrip() {
        let joints = JointData::from_slice(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        let pt = JointTrajPt::new(7, joints, 0.25, 1.5);
        let msg = SimpleMessage::request(MessageBody::JointTrajPt(pt));
        let decoded = roundtrip(msg.clone());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_traj_pt_full_roundtrip() {
        let mut pt = JointTrajPtFull::new(0, 3, 2.5);
        pt.set_positions(JointData::from_slice(&[1.0, -1.0, 0.5]).unwrap());
        pt.set_velocities(JointData::from_slice(&[0.1, 0.2, 0.3]).unwrap());
        let msg = SimpleMessage::request(MessageBody::JointTrajPtFull(pt));
        let decoded = roundtrip(msg.clone());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_traj_pt_full_valid_fields_tracking() {
        let mut pt = JointTrajPtFull::new(0, 0, 0.0);
        assert_eq!(pt.valid_fields, valid_fields::TIME);
        pt.set_positions(JointData::new());
        assert_eq!(pt.valid_fields, valid_fields::TIME | valid_fields::POSITION);
        pt.set_accelerations(JointData::new());
        assert_ne!(pt.valid_fields & valid_fields::ACCELERATION, 0);
        assert_eq!(pt.valid_fields & valid_fields::VELOCITY, 0);
    }

    #[test]
    fn test_traj_pt_full_ex_roundtrip() {
        let make_group = |id: i32| GroupTrajPtData {
            group_id: id,
            valid_fields: valid_fields::TIME | valid_fields::POSITION,
            time: 1.0 + id as f32,
            positions: JointData::from_slice(&[0.1 * id as f64; 6]).unwrap(),
            velocities: JointData::new(),
            accelerations: JointData::new(),
        };
        let pt = JointTrajPtFullEx::new(5, vec![make_group(0), make_group(1)]).unwrap();
        let msg = SimpleMessage::request(MessageBody::JointTrajPtFullEx(pt));
        let decoded = roundtrip(msg.clone());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_traj_pt_full_ex_too_many_groups() {
        let group = GroupTrajPtData {
            group_id: 0,
            valid_fields: 0,
            time: 0.0,
            positions: JointData::new(),
            velocities: JointData::new(),
            accelerations: JointData::new(),
        };
        let err = JointTrajPtFullEx::new(0, vec![group; 5]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TooManyGroups { count: 5, max: 4 }
        ));
    }
}
