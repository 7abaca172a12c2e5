//! TOML 配置加载
//!
//! ```toml
//! robot_ip = "192.168.255.1"
//! port = 50240
//!
//! [velocity_limits]
//! joint_s = 2.26
//! joint_l = 2.26
//!
//! [[group]]
//! id = 0
//! name = "manipulator"
//! joint_names = ["joint_s", "joint_l", "joint_u", "joint_r", "joint_b", "joint_t"]
//!
//! [streamer]
//! reconnect_budget = 5
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::DriverError;
use crate::streamer::StreamerConfig;
use crate::types::RobotGroup;

/// 控制器运动服务的默认 TCP 端口
pub const DEFAULT_MOTION_PORT: u16 = 50240;

/// 驱动配置
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// 控制器 IP 地址
    pub robot_ip: String,
    /// 运动服务端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 运动组定义
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupConfig>,
    /// 关节限速表（缺失则跳过限速校验）
    #[serde(default)]
    pub velocity_limits: HashMap<String, f64>,
    /// 流式循环参数
    #[serde(default)]
    pub streamer: StreamerSection,
}

/// 单个运动组的配置
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub ns: String,
    pub joint_names: Vec<String>,
}

/// 流式循环参数（时长字段单位为毫秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamerSection {
    pub loop_period_ms: u64,
    pub idle_period_ms: u64,
    pub reconnect_settle_ms: u64,
    pub reconnect_budget: u32,
    pub point_stream_timeout_ms: u64,
}

impl Default for StreamerSection {
    fn default() -> Self {
        let config = StreamerConfig::default();
        Self {
            loop_period_ms: config.loop_period.as_millis() as u64,
            idle_period_ms: config.idle_period.as_millis() as u64,
            reconnect_settle_ms: config.reconnect_settle.as_millis() as u64,
            reconnect_budget: config.reconnect_budget,
            point_stream_timeout_ms: config.point_stream_timeout.as_millis() as u64,
        }
    }
}

impl StreamerSection {
    pub fn to_streamer_config(&self) -> StreamerConfig {
        StreamerConfig {
            loop_period: Duration::from_millis(self.loop_period_ms),
            idle_period: Duration::from_millis(self.idle_period_ms),
            reconnect_settle: Duration::from_millis(self.reconnect_settle_ms),
            reconnect_budget: self.reconnect_budget,
            point_stream_timeout: Duration::from_millis(self.point_stream_timeout_ms),
        }
    }
}

impl DriverConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| DriverError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DriverError::Config(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), DriverError> {
        if self.robot_ip.is_empty() {
            return Err(DriverError::Config("robot_ip is empty".into()));
        }
        if self.port == 0 {
            return Err(DriverError::Config("port must be non-zero".into()));
        }
        if self.groups.is_empty() {
            return Err(DriverError::Config("at least one [[group]] is required".into()));
        }
        for group in &self.groups {
            if group.joint_names.is_empty() {
                return Err(DriverError::Config(format!(
                    "group {} has no joint_names",
                    group.id
                )));
            }
        }
        if self.velocity_limits.is_empty() {
            warn!("No velocity limits configured, velocity checking disabled");
        }
        Ok(())
    }

    /// 控制器地址（"ip:port" 形式）
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.robot_ip, self.port)
    }

    /// 转换为运动组定义
    pub fn robot_groups(&self) -> Vec<RobotGroup> {
        self.groups
            .iter()
            .map(|g| RobotGroup::new(g.id, g.name.clone(), g.ns.clone(), g.joint_names.clone()))
            .collect()
    }
}

fn default_port() -> u16 {
    DEFAULT_MOTION_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        robot_ip = "192.168.255.1"
        port = 50241

        [velocity_limits]
        joint_s = 2.26
        joint_l = 1.5

        [[group]]
        id = 0
        name = "left_arm"
        ns = "left"
        joint_names = ["joint_s", "joint_l"]

        [[group]]
        id = 1
        name = "right_arm"
        joint_names = ["joint_s", "joint_l"]

        [streamer]
        reconnect_budget = 3
        point_stream_timeout_ms = 5000
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = DriverConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.endpoint(), "192.168.255.1:50241");
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[1].ns, "");
        assert_eq!(config.velocity_limits["joint_s"], 2.26);

        let streamer = config.streamer.to_streamer_config();
        assert_eq!(streamer.reconnect_budget, 3);
        assert_eq!(streamer.point_stream_timeout, Duration::from_secs(5));
        // 未指定的字段取默认值
        assert_eq!(streamer.loop_period, Duration::from_millis(5));
    }

    #[test]
    fn test_default_port() {
        let config = DriverConfig::from_toml_str(
            r#"
            robot_ip = "10.0.0.2"

            [[group]]
            id = 0
            name = "manipulator"
            joint_names = ["j1"]
            "#,
        )
        .unwrap();
        assert_eq!(config.port, DEFAULT_MOTION_PORT);
        assert!(config.velocity_limits.is_empty());
    }

    #[test]
    fn test_empty_ip_rejected() {
        let err = DriverConfig::from_toml_str(
            r#"
            robot_ip = ""

            [[group]]
            id = 0
            name = "manipulator"
            joint_names = ["j1"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("robot_ip")));
    }

    #[test]
    fn test_missing_groups_rejected() {
        let err = DriverConfig::from_toml_str(r#"robot_ip = "10.0.0.2""#).unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("group")));
    }

    #[test]
    fn test_group_without_joints_rejected() {
        let err = DriverConfig::from_toml_str(
            r#"
            robot_ip = "10.0.0.2"

            [[group]]
            id = 0
            name = "manipulator"
            joint_names = []
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("joint_names")));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = DriverConfig::from_toml_str("robot_ip = [").unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("TOML parse error")));
    }
}
