//! 流式发送循环
//!
//! 单线程顺序发送：每次迭代最多发送一个点并等待回复。确认推进、
//! BUSY 原样重发、失败中止、断线自动重连。循环体内严格遵守两锁
//! 纪律：网络往返期间不持有缓冲锁。

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use moto_net::{MessageConnection, NetError};
use moto_protocol::{MessageBody, SimpleMessage};
use tracing::{debug, error, info, warn};

use crate::profile::{ControllerProfile, ReplyDisposition};
use crate::state::{StreamerContext, TransferState};

/// 流式循环参数
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// 活动状态下的迭代周期
    pub loop_period: Duration,
    /// 空闲状态下的休眠周期
    pub idle_period: Duration,
    /// 重连成功后的静置时长（给控制器侧会话就绪留时间）
    pub reconnect_settle: Duration,
    /// 单条轨迹允许的连续重连次数
    pub reconnect_budget: u32,
    /// 逐点模式下队列持续为空多久后结束会话
    pub point_stream_timeout: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            loop_period: Duration::from_millis(5),
            idle_period: Duration::from_millis(250),
            reconnect_settle: Duration::from_millis(250),
            reconnect_budget: 5,
            point_stream_timeout: Duration::from_secs(2),
        }
    }
}

/// 流式循环对外发布的事件
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// 一个点被控制器确认入队
    PointAcked { seq: i32 },
    /// 整条轨迹发送完成
    TrajectoryComplete,
    /// 轨迹被中止（附原因）
    Aborted { reason: String },
    /// 连接断开后重连成功
    Reconnected,
    /// 逐点会话因队列长时间为空而结束
    PointSessionTimeout,
}

/// 本次迭代从缓冲中取出的待发送单元
struct CapturedPoint {
    message: SimpleMessage,
    generation: u64,
    state: TransferState,
}

/// 流式发送循环（阻塞，直到 `ctx.running` 置 false）
pub(crate) fn streaming_loop(
    conn: Arc<Mutex<Box<dyn MessageConnection + Send>>>,
    ctx: Arc<StreamerContext>,
    profile: Arc<dyn ControllerProfile>,
    config: StreamerConfig,
    events: Sender<StreamEvent>,
) {
    let mut reconnects_left = config.reconnect_budget;

    while ctx.running.load(Ordering::Acquire) {
        let state = ctx.state.load();
        if state == TransferState::Idle {
            reconnects_left = config.reconnect_budget;
            spin_sleep::sleep(config.idle_period);
            continue;
        }

        // 活动状态下先保证连接可用
        if !ensure_connected(&conn, &ctx, &config, &mut reconnects_left, &events) {
            continue;
        }

        let captured = match capture_point(&ctx, &config, &events) {
            Ok(Some(captured)) => captured,
            Ok(None) => {
                spin_sleep::sleep(config.loop_period);
                continue;
            }
            Err(PoisonedBuffer) => {
                error!("Buffer lock poisoned, stopping streaming loop");
                return;
            }
        };

        // 网络往返：只持连接锁
        let result = match conn.lock() {
            Ok(mut conn) => conn.send_and_receive(&captured.message),
            Err(_) => {
                error!("Connection lock poisoned, stopping streaming loop");
                return;
            }
        };

        match result {
            Ok(reply) => {
                reconnects_left = config.reconnect_budget;
                match profile.classify_reply(&reply) {
                    ReplyDisposition::Ack => commit_point(&ctx, &captured, &events),
                    ReplyDisposition::Busy => {
                        // 控制器流控：下次迭代原样重发同一个点
                        debug!(seq = msg_seq(&captured.message), "Controller busy, retrying point");
                    }
                    ReplyDisposition::Abort(reason) => {
                        error!("Aborting trajectory: {reason}");
                        abort(&ctx, captured.generation, reason, &events);
                    }
                }
            }
            Err(NetError::Protocol(e)) => {
                // 回复无法解读：连接仍健康，但会话状态已不可信
                error!("Aborting trajectory: unreadable reply ({e})");
                abort(&ctx, captured.generation, format!("Unreadable reply: {e}"), &events);
            }
            Err(e) => {
                // 传输错误：连接已被丢弃，下次迭代走重连路径重发本点
                warn!("Transport error while streaming: {e}");
            }
        }

        spin_sleep::sleep(config.loop_period);
    }
}

/// 连接检查与重连
///
/// 返回 false 表示本次迭代不应继续发送（重连失败或预算耗尽）。
fn ensure_connected(
    conn: &Arc<Mutex<Box<dyn MessageConnection + Send>>>,
    ctx: &Arc<StreamerContext>,
    config: &StreamerConfig,
    reconnects_left: &mut u32,
    events: &Sender<StreamEvent>,
) -> bool {
    let connected = match conn.lock() {
        Ok(conn) => conn.is_connected(),
        Err(_) => return false,
    };
    if connected {
        return true;
    }

    if *reconnects_left == 0 {
        error!("Reconnect budget exhausted. Send new motion command to retry");
        abort(
            ctx,
            current_generation(ctx),
            "Connection lost (reconnect budget exhausted)".to_string(),
            events,
        );
        *reconnects_left = config.reconnect_budget;
        return false;
    }
    *reconnects_left -= 1;

    let result = match conn.lock() {
        Ok(mut conn) => conn.connect(),
        Err(_) => return false,
    };
    match result {
        Ok(()) => {
            info!("Reconnected to motion server");
            let _ = events.send(StreamEvent::Reconnected);
            // 控制器侧会话重建需要时间，静置后再继续发点
            spin_sleep::sleep(config.reconnect_settle);
            true
        }
        Err(e) => {
            warn!(
                remaining = *reconnects_left,
                "Reconnect attempt failed: {e}"
            );
            spin_sleep::sleep(config.reconnect_settle);
            false
        }
    }
}

/// 缓冲锁被毒化（持锁线程 panic），循环无法继续
struct PoisonedBuffer;

/// 在缓冲锁内取出下一个待发送的点
fn capture_point(
    ctx: &Arc<StreamerContext>,
    config: &StreamerConfig,
    events: &Sender<StreamEvent>,
) -> Result<Option<CapturedPoint>, PoisonedBuffer> {
    let mut buf = ctx.buffer.lock().map_err(|_| PoisonedBuffer)?;
    let captured = match ctx.state.load() {
        TransferState::Idle => None,
        TransferState::Streaming => {
            if buf.is_complete() {
                ctx.state.store(TransferState::Idle);
                info!("Trajectory streaming complete");
                let _ = events.send(StreamEvent::TrajectoryComplete);
                None
            } else {
                Some(CapturedPoint {
                    message: buf.messages[buf.cursor].clone(),
                    generation: buf.generation,
                    state: TransferState::Streaming,
                })
            }
        }
        TransferState::PointStreaming => match buf.point_queue.front() {
            Some(msg) => Some(CapturedPoint {
                message: msg.clone(),
                generation: buf.generation,
                state: TransferState::PointStreaming,
            }),
            None => {
                if let Some(last) = buf.last_point_at {
                    if last.elapsed() > config.point_stream_timeout {
                        buf.last_point_at = None;
                        ctx.state.store(TransferState::Idle);
                        info!("Point streaming session timed out, returning to idle");
                        let _ = events.send(StreamEvent::PointSessionTimeout);
                    }
                }
                None
            }
        },
    };
    Ok(captured)
}

/// 确认回复后的提交：仅当代际与状态都未被并发命令改变时推进
fn commit_point(ctx: &Arc<StreamerContext>, captured: &CapturedPoint, events: &Sender<StreamEvent>) {
    let Ok(mut buf) = ctx.buffer.lock() else {
        return;
    };
    if buf.generation != captured.generation || ctx.state.load() != captured.state {
        // 往返期间被新命令覆盖，丢弃本次确认
        debug!("Stale ack dropped (command superseded)");
        return;
    }
    match captured.state {
        TransferState::Streaming => {
            buf.cursor += 1;
            let _ = events.send(StreamEvent::PointAcked {
                seq: msg_seq(&captured.message),
            });
            if buf.is_complete() {
                ctx.state.store(TransferState::Idle);
                info!("Trajectory streaming complete");
                let _ = events.send(StreamEvent::TrajectoryComplete);
            }
        }
        TransferState::PointStreaming => {
            buf.point_queue.pop_front();
            // 会话空置超时从最后一个被确认的点起算
            buf.last_point_at = Some(Instant::now());
            let _ = events.send(StreamEvent::PointAcked {
                seq: msg_seq(&captured.message),
            });
        }
        TransferState::Idle => {}
    }
}

/// 中止当前传输，回到空闲状态
fn abort(ctx: &Arc<StreamerContext>, generation: u64, reason: String, events: &Sender<StreamEvent>) {
    let Ok(mut buf) = ctx.buffer.lock() else {
        return;
    };
    if buf.generation != generation {
        return;
    }
    buf.clear();
    ctx.state.store(TransferState::Idle);
    let _ = events.send(StreamEvent::Aborted { reason });
}

fn current_generation(ctx: &Arc<StreamerContext>) -> u64 {
    ctx.buffer.lock().map(|b| b.generation).unwrap_or(0)
}

/// 提取消息的点序号（日志 / 事件用）
fn msg_seq(msg: &SimpleMessage) -> i32 {
    match &msg.body {
        MessageBody::JointTrajPt(pt) => pt.seq,
        MessageBody::JointTrajPtFull(pt) => pt.seq,
        MessageBody::JointTrajPtFullEx(pt) => pt.seq,
        MessageBody::MotionCtrl(cmd) => cmd.seq,
        MessageBody::MotionReply(reply) => reply.seq,
    }
}
