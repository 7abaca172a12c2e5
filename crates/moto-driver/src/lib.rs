//! # Moto Driver
//!
//! 运动控制器的轨迹流式驱动。
//!
//! ## 架构
//!
//! - `config`: TOML 配置加载
//! - `types`: 轨迹与运动组数据模型
//! - `pipeline`: 轨迹点转换流水线（重排 / 变换 / 速度比 / 时长）
//! - `validator`: 发送前的轨迹校验
//! - `profile`: 控制器档位（线格式、校验强度、停止方式的定制点）
//! - `state`: 传输状态机与共享缓冲
//! - `streamer`: 后台流式发送循环
//! - `motion`: 运动模式控制命令
//! - `driver`: [`TrajectoryStreamer`] 门面
//!
//! ## 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use moto_driver::{DriverConfig, MotoProfile, TrajectoryStreamer};
//!
//! # fn main() -> Result<(), moto_driver::DriverError> {
//! let config = DriverConfig::load("driver.toml")?;
//! let driver = TrajectoryStreamer::from_config(&config, Arc::new(MotoProfile))?;
//!
//! driver.enable()?;
//! // driver.submit(&trajectory)?;
//! driver.disable()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod motion;
pub mod pipeline;
pub mod profile;
pub mod state;
pub mod streamer;
pub mod types;
pub mod validator;

pub use config::{DEFAULT_MOTION_PORT, DriverConfig, GroupConfig};
pub use driver::TrajectoryStreamer;
pub use error::DriverError;
pub use motion::MotionController;
pub use pipeline::{ConvertedPoint, IdentityTransform, JointTransform, PointConverter};
pub use profile::{ControllerProfile, GenericProfile, MotoProfile, ReplyDisposition};
pub use state::TransferState;
pub use streamer::{StreamEvent, StreamerConfig};
pub use types::{GroupWaypoint, PoseSample, RobotGroup, Trajectory, TrajectoryPoint, VelocityLimits};
