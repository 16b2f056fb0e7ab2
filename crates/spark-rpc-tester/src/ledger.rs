//! 待决完成账本。
//!
//! # 教案式综述
//! - **意图 (Why)**：完成标签从原始队列到达后并不立即生效，而是停在账本里，等待测试决定
//!   “前 N 个以什么结果完成”。
//! - **结构 (How)**：`VecDeque` 保持到达顺序；决议时先整体校验前置条件，再一次性取出前 N 个并依次完成。
//! - **契约 (What)**：
//!   - 账本只在串行工作队列上被读写（由 [`spark_rpc::QueueConfined`] 检查），自身不加锁；
//!   - 请求决议的数量超过已到达数量属于测试场景错误，直接 panic，绝不截断或忽略；
//!   - 第 i 旧的标签与第 i 个结果配对。

use std::collections::VecDeque;

use bytes::Bytes;
use spark_rpc::{Completion, OperationKind, Status};

/// 测试为某个完成选择的合成结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionOutcome {
    Ok,
    Error,
}

impl CompletionOutcome {
    /// 回调收到的“成功”标记：`Ok → true`，`Error → false`。
    pub const fn succeeded(self) -> bool {
        matches!(self, CompletionOutcome::Ok)
    }
}

/// 带附加期望的决议请求。
///
/// 除结果外，还可声明期望的操作种类（不符即 panic）、为读操作注入的消息，以及注入的终态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionEndState {
    kind: Option<OperationKind>,
    outcome: CompletionOutcome,
    message: Option<Bytes>,
    status: Option<Status>,
}

impl CompletionEndState {
    pub fn new(kind: OperationKind, outcome: CompletionOutcome) -> Self {
        Self {
            kind: Some(kind),
            ..Self::any(outcome)
        }
    }

    /// 不校验操作种类。
    pub fn any(outcome: CompletionOutcome) -> Self {
        Self {
            kind: None,
            outcome,
            message: None,
            status: None,
        }
    }

    /// 成功的读操作，携带 `message`。
    pub fn read(message: impl Into<Bytes>) -> Self {
        Self::new(OperationKind::Read, CompletionOutcome::Ok).with_message(message)
    }

    /// 以 `status` 结束的读操作（对端关闭流）。
    pub fn end_of_stream(status: Status) -> Self {
        Self::new(OperationKind::Read, CompletionOutcome::Error).with_status(status)
    }

    /// 成功的 finish 操作，交付 `status`。
    pub fn finish(status: Status) -> Self {
        Self::new(OperationKind::Finish, CompletionOutcome::Ok).with_status(status)
    }

    pub fn with_message(mut self, message: impl Into<Bytes>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.kind
    }

    pub fn outcome(&self) -> CompletionOutcome {
        self.outcome
    }
}

impl From<CompletionOutcome> for CompletionEndState {
    fn from(outcome: CompletionOutcome) -> Self {
        Self::any(outcome)
    }
}

/// 已到达但尚未决议的完成，按到达顺序排列。
#[derive(Debug, Default)]
pub struct PendingCompletions {
    entries: VecDeque<Completion>,
    arrived_total: u64,
    resolved_total: u64,
}

impl PendingCompletions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, completion: Completion) {
        tracing::trace!(
            id = completion.id(),
            kind = %completion.kind(),
            pending = self.entries.len() + 1,
            "completion pending"
        );
        self.entries.push_back(completion);
        self.arrived_total += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 当前待决完成的操作种类，按到达顺序。
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.entries.iter().map(Completion::kind).collect()
    }

    pub fn arrived_total(&self) -> u64 {
        self.arrived_total
    }

    pub fn resolved_total(&self) -> u64 {
        self.resolved_total
    }

    /// 以给定结果依序决议最旧的 `outcomes.len()` 个完成。
    ///
    /// # Panics
    /// 待决数量少于 `outcomes.len()`。
    pub fn resolve(&mut self, outcomes: &[CompletionOutcome]) {
        let batch = self.take_oldest(outcomes.len());
        for (completion, outcome) in batch.into_iter().zip(outcomes) {
            completion.complete(outcome.succeeded());
        }
    }

    /// 按 [`CompletionEndState`] 决议最旧的若干完成。
    ///
    /// 所有种类期望先整体校验，任何不符都会在完成第一个标签之前 panic。
    ///
    /// # Panics
    /// 待决数量不足，或某个完成的种类与期望不符。
    pub fn resolve_with(&mut self, end_states: &[CompletionEndState]) {
        self.ensure_pending(end_states.len());
        for (position, (completion, end_state)) in self.entries.iter().zip(end_states).enumerate() {
            if let Some(expected) = end_state.kind {
                assert!(
                    completion.kind() == expected,
                    "pending completion #{position} is a {} operation, expected {expected}",
                    completion.kind()
                );
            }
        }

        let batch = self.take_oldest(end_states.len());
        for (mut completion, end_state) in batch.into_iter().zip(end_states) {
            if let Some(message) = &end_state.message {
                completion.set_message(message.clone());
            }
            if let Some(status) = &end_state.status {
                completion.set_status(status.clone());
            }
            completion.complete(end_state.outcome.succeeded());
        }
    }

    fn ensure_pending(&self, requested: usize) {
        assert!(
            self.entries.len() >= requested,
            "cannot resolve {requested} completions: only {} pending",
            self.entries.len()
        );
    }

    fn take_oldest(&mut self, count: usize) -> Vec<Completion> {
        self.ensure_pending(count);
        self.resolved_total += count as u64;
        self.entries.drain(..count).collect()
    }
}
