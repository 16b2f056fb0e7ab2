//! 模拟信道与调用。
//!
//! # 教案式综述
//! - **意图 (Why)**：在没有真实对端的情况下复刻调用的完成语义：挂起的操作永远不会自行完成，
//!   只有取消才会让它们“快速失败”并被推入原始完成队列。
//! - **结构 (How)**：[`CallContext`] 持有显式状态 [`CallState`] 与在途操作列表；[`FakeChannel::prepare_call`]
//!   把上下文绑定到某个 [`CompletionQueue`] 并返回 [`FakeCall`]，后者负责发起 start/read/write/finish。
//! - **契约 (What)**：
//!   - 取消幂等：首次返回 `true` 并按发起顺序推出全部在途标签，此后返回 `false` 且无副作用；
//!   - 已取消调用上新发起的操作立即以 `ok = false` 入队；
//!   - 每个标签恰好入队一次。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::completion::{Completion, OperationKind};
use crate::completion_queue::CompletionQueue;
use crate::status::Status;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// 调用上下文的显式状态，单向迁移 `Active → Cancelled`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallState {
    #[default]
    Active,
    Cancelled,
}

/// 可取消的调用句柄，克隆后共享同一状态。
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<Mutex<ContextInner>>,
}

struct ContextInner {
    id: u64,
    state: CallState,
    queue: Option<Arc<CompletionQueue>>,
    outstanding: VecDeque<Completion>,
    written: Vec<Bytes>,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextInner {
                id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
                state: CallState::Active,
                queue: None,
                outstanding: VecDeque::new(),
                written: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.lock().id
    }

    pub fn state(&self) -> CallState {
        self.inner.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == CallState::Cancelled
    }

    /// 请求取消调用。
    ///
    /// 返回 `true` 表示本次调用触发了 `Active → Cancelled`；已取消时返回 `false`。
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == CallState::Cancelled {
            tracing::trace!(call = inner.id, "cancel ignored: already cancelled");
            return false;
        }
        inner.state = CallState::Cancelled;
        let failed: Vec<Completion> = inner.outstanding.drain(..).collect();
        tracing::debug!(call = inner.id, failed = failed.len(), "call cancelled");
        // 持锁推送，保证与并发发起的操作之间仍保持 FIFO。
        if let Some(queue) = inner.queue.as_ref() {
            for tag in failed {
                if let Err(err) = queue.push(tag, false) {
                    tracing::warn!(
                        call = inner.id,
                        code = err.code(),
                        "fast-failed completion lost"
                    );
                }
            }
        }
        true
    }

    /// 尚未完成的操作数量。
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding.len()
    }

    fn bind(&self, queue: &Arc<CompletionQueue>) {
        let mut inner = self.inner.lock();
        assert!(
            inner.queue.is_none(),
            "call context {} is already bound to a completion queue",
            inner.id
        );
        inner.queue = Some(Arc::clone(queue));
    }

    fn issue(&self, tag: Completion) {
        let mut inner = self.inner.lock();
        match inner.state {
            CallState::Active => {
                tracing::trace!(
                    call = inner.id,
                    id = tag.id(),
                    kind = %tag.kind(),
                    "operation pending"
                );
                inner.outstanding.push_back(tag);
            }
            CallState::Cancelled => {
                tracing::trace!(
                    call = inner.id,
                    id = tag.id(),
                    kind = %tag.kind(),
                    "operation fast-failed"
                );
                let Some(queue) = inner.queue.as_ref() else {
                    return;
                };
                if let Err(err) = queue.push(tag, false) {
                    tracing::warn!(
                        call = inner.id,
                        code = err.code(),
                        "fast-failed completion lost"
                    );
                }
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 模拟信道：只负责为调用绑定完成队列。
#[derive(Default)]
pub struct FakeChannel {
    target: String,
    prepared: AtomicU64,
}

impl FakeChannel {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            prepared: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// 准备一次调用，其全部完成标签都会进入 `queue`。
    ///
    /// # Panics
    /// `context` 已经绑定过完成队列。
    pub fn prepare_call(
        &self,
        context: &CallContext,
        method: impl Into<String>,
        queue: &Arc<CompletionQueue>,
    ) -> FakeCall {
        context.bind(queue);
        self.prepared.fetch_add(1, Ordering::Relaxed);
        let method = method.into();
        tracing::debug!(target_addr = %self.target, %method, call = context.id(), "call prepared");
        FakeCall {
            context: context.clone(),
            method,
        }
    }

    pub fn calls_prepared(&self) -> u64 {
        self.prepared.load(Ordering::Relaxed)
    }
}

/// 绑定到完成队列的模拟调用。
pub struct FakeCall {
    context: CallContext,
    method: String,
}

impl FakeCall {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn start(&self, tag: Completion) {
        debug_assert_eq!(tag.kind(), OperationKind::Start);
        self.context.issue(tag);
    }

    pub fn read(&self, tag: Completion) {
        debug_assert_eq!(tag.kind(), OperationKind::Read);
        self.context.issue(tag);
    }

    /// 发起写操作；消息被记录，供测试核对客户端实际写出的内容。
    pub fn write(&self, message: Bytes, tag: Completion) {
        debug_assert_eq!(tag.kind(), OperationKind::Write);
        self.context.inner.lock().written.push(message);
        self.context.issue(tag);
    }

    pub fn finish(&self, tag: Completion) {
        debug_assert_eq!(tag.kind(), OperationKind::Finish);
        self.context.issue(tag);
    }

    /// 调用当前的终态：取消后为 `Cancelled`，否则为 `Ok`。
    pub fn status(&self) -> Status {
        match self.context.state() {
            CallState::Active => Status::ok(),
            CallState::Cancelled => Status::cancelled("call cancelled by client"),
        }
    }

    pub fn written_messages(&self) -> Vec<Bytes> {
        self.context.inner.lock().written.clone()
    }
}
