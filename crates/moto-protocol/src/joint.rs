//! 固定宽度关节数组
//!
//! 线格式为每条消息保留 10 个关节槽位，未使用的槽位填零。

use crate::{ByteReader, ByteWriter, MAX_NUM_JOINTS, ProtocolError};

/// 固定 10 槽位的关节数值数组（位置 / 速度 / 加速度通用）
///
/// 槽位数量是线格式约束：组内实际关节数少于 10 时其余槽位为 0，
/// 这只是填充，不代表语义上的默认值。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointData {
    values: [f32; MAX_NUM_JOINTS],
}

impl JointData {
    /// 全零数组
    pub fn new() -> Self {
        Self::default()
    }

    /// 从切片构造（f64 → f32 截断转换）
    ///
    /// # 错误
    /// - `ProtocolError::TooManyJoints`: 切片长度超过 10
    pub fn from_slice(values: &[f64]) -> Result<Self, ProtocolError> {
        if values.len() > MAX_NUM_JOINTS {
            return Err(ProtocolError::TooManyJoints {
                count: values.len(),
                max: MAX_NUM_JOINTS,
            });
        }
        let mut data = Self::new();
        for (i, v) in values.iter().enumerate() {
            data.values[i] = *v as f32;
        }
        Ok(data)
    }

    /// 读取指定槽位
    pub fn get(&self, index: usize) -> f32 {
        self.values[index]
    }

    /// 写入指定槽位
    pub fn set(&mut self, index: usize, value: f32) {
        self.values[index] = value;
    }

    /// 以切片形式访问全部槽位
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        for v in &self.values {
            w.write_f32(*v);
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let mut data = Self::new();
        for i in 0..MAX_NUM_JOINTS {
            data.values[i] = r.read_f32()?;
        }
        Ok(data)
    }
}
