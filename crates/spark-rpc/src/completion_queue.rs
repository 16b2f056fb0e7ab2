use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::completion::Completion;
use crate::error::{Result, RpcError};

/// 原始完成队列：传输层在自身线程上推入完成标签，轮询方阻塞拉取。
///
/// # 教案式说明
/// - **意图 (Why)**：复刻“完成通知队列”的时序契约，FIFO、阻塞 `next`、关闭后先排空再报告关闭。
/// - **逻辑 (How)**：`parking_lot::Mutex` 保护 `VecDeque` 与关闭标记，`Condvar` 唤醒阻塞的拉取方。
/// - **契约 (What)**：
///   - `push` 在关闭后返回 [`RpcError::QueueShutdown`]，标签随错误一同被丢弃；
///   - `next` 仅在“已关闭且为空”时返回 `None`，关闭前已入队的条目仍会被交付；
///   - `shutdown` 幂等。
#[derive(Default)]
pub struct CompletionQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<(Completion, bool)>,
    pushed_total: u64,
    shut_down: bool,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推入一个完成标签及其原始结果位。
    pub fn push(&self, tag: Completion, ok: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            tracing::warn!(
                id = tag.id(),
                kind = %tag.kind(),
                "push rejected: completion queue shut down"
            );
            return Err(RpcError::QueueShutdown {
                queue: "completion queue",
            });
        }
        tracing::trace!(id = tag.id(), kind = %tag.kind(), ok, "completion queued");
        state.entries.push_back((tag, ok));
        state.pushed_total += 1;
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// 阻塞直到取得下一条目，或队列已关闭且排空。
    pub fn next(&self) -> Option<(Completion, bool)> {
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.entries.pop_front() {
                return Some(entry);
            }
            if state.shut_down {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// 关闭队列；重复调用无副作用。
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        tracing::debug!(remaining = state.entries.len(), "completion queue shut down");
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// 自创建以来被接受的条目总数。
    pub fn pushed_total(&self) -> u64 {
        self.state.lock().pushed_total
    }
}
