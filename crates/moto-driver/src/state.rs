//! 流式传输状态机与共享缓冲
//!
//! 状态机只有三个状态：空闲 / 整轨流式 / 单点流式。状态字段本身用
//! 原子量表示，便于在不拿缓冲锁的情况下快速观测；所有"状态 + 缓冲"
//! 的复合变更都必须在持有 [`StreamBuffer`] 锁时进行。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use moto_protocol::SimpleMessage;

use crate::types::PoseSample;

/// 传输状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferState {
    /// 空闲，流式循环低频休眠
    Idle = 0,
    /// 正在发送一条预转换好的完整轨迹
    Streaming = 1,
    /// 逐点流式：点到即发
    PointStreaming = 2,
}

impl TransferState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Streaming,
            2 => Self::PointStreaming,
            _ => Self::Idle,
        }
    }
}

/// 原子包装的传输状态
///
/// 读路径（外部观测、循环调度）无锁；写路径必须持有缓冲锁，
/// 保证状态与缓冲内容的一致性。
#[derive(Debug)]
pub struct AtomicTransferState {
    inner: AtomicU8,
}

impl AtomicTransferState {
    pub fn new(state: TransferState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    pub fn load(&self) -> TransferState {
        TransferState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 仅允许在持有缓冲锁时调用
    pub(crate) fn store(&self, state: TransferState) {
        self.inner.store(state as u8, Ordering::Release);
    }
}

impl Default for AtomicTransferState {
    fn default() -> Self {
        Self::new(TransferState::Idle)
    }
}

/// 流式缓冲：当前正在传输的消息序列与逐点队列
///
/// `generation` 在每次装载新命令时递增。流式循环在发送一个点的
/// 网络往返期间不持有本锁；回来提交游标前比较 generation，若期间
/// 有新命令覆盖则放弃本次提交（latest-command-wins）。
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// 整轨模式下预转换好的全部消息
    pub messages: Vec<SimpleMessage>,
    /// 下一个待确认的消息下标
    pub cursor: usize,
    /// 逐点模式下的待发队列
    pub point_queue: VecDeque<SimpleMessage>,
    /// 逐点模式下最近一次收到新点的时刻
    pub last_point_at: Option<Instant>,
    /// 命令代际计数
    pub generation: u64,
    /// 逐点模式下分配给下一个点的序号
    pub next_point_seq: i32,
}

impl StreamBuffer {
    /// 清空全部传输内容（状态切换由调用方在同一临界区内完成）
    pub fn clear(&mut self) {
        self.messages.clear();
        self.cursor = 0;
        self.point_queue.clear();
        self.last_point_at = None;
        self.generation += 1;
    }

    /// 装载一条新的整轨命令
    pub fn load_trajectory(&mut self, messages: Vec<SimpleMessage>) {
        self.clear();
        self.messages = messages;
    }

    /// 整轨模式下是否已全部确认
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.messages.len()
    }

    /// 剩余未确认的点数（整轨 + 逐点）
    pub fn pending(&self) -> usize {
        self.messages.len().saturating_sub(self.cursor) + self.point_queue.len()
    }
}

/// 流式循环与外部 API 之间的共享上下文
///
/// 两把锁的纪律：连接锁（在 [`crate::motion::MotionController`] 内）
/// 串行化网络交换；缓冲锁保护传输进度。持缓冲锁时不得做网络 IO，
/// 两把锁都要拿时先放缓冲锁。
pub struct StreamerContext {
    /// 当前传输状态
    pub state: AtomicTransferState,
    /// 传输缓冲
    pub buffer: Mutex<StreamBuffer>,
    /// 每组最近一次关节状态采样（group_id → sample）
    pub poses: HashMap<i32, ArcSwapOption<PoseSample>>,
    /// 流式循环运行标志（false 时循环退出）
    pub running: AtomicBool,
}

impl StreamerContext {
    pub fn new(group_ids: impl IntoIterator<Item = i32>) -> Self {
        let poses = group_ids
            .into_iter()
            .map(|id| (id, ArcSwapOption::empty()))
            .collect();
        Self {
            state: AtomicTransferState::default(),
            buffer: Mutex::new(StreamBuffer::default()),
            poses,
            running: AtomicBool::new(true),
        }
    }

    /// 读取某组最近的关节状态采样
    pub fn pose(&self, group_id: i32) -> Option<std::sync::Arc<PoseSample>> {
        self.poses.get(&group_id).and_then(|slot| slot.load_full())
    }
}
