//! 驱动层错误类型定义

use moto_net::NetError;
use moto_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
///
/// 分类遵循恢复策略：配置错误在初始化阶段致命；校验拒绝同步返回给
/// 提交方；协议 / 控制器错误中止当前流式操作；传输错误由流式循环
/// 自动重连恢复。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 连接层错误
    #[error("Connection error: {0}")]
    Net(#[from] NetError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效（初始化阶段致命）
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// 引用了未配置的运动组
    #[error("Unknown motion group: {0}")]
    UnknownGroup(i32),

    /// 期望的机器人关节在输入轨迹中缺失
    #[error("Expected joint '{0}' not found in trajectory, aborting command")]
    JointNotFound(String),

    /// 轨迹校验拒绝
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 当前控制器档位不支持多组轨迹
    #[error("Multi-group trajectories are not supported by this controller profile")]
    MultiGroupUnsupported,

    /// 控制器未就绪（附控制器侧诊断文本）
    #[error("Controller not ready: {0}")]
    NotReady(String),

    /// 控制器报告的命令失败（附控制器侧诊断文本）
    #[error("Controller fault: {0}")]
    ControllerFault(String),

    /// 收到了类型不符的回复帧
    #[error("Unexpected reply (expected {expected})")]
    UnexpectedReply { expected: &'static str },

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}
