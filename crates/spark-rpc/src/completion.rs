use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::status::Status;

static NEXT_COMPLETION_ID: AtomicU64 = AtomicU64::new(1);

/// 流上可挂起的异步操作种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Start,
    Read,
    Write,
    Finish,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Start => "start",
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Finish => "finish",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 完成回调收到的事件。
#[derive(Debug)]
pub struct CompletionEvent {
    pub id: u64,
    pub kind: OperationKind,
    /// 操作是否成功完成。
    pub ok: bool,
    /// 读操作携带的消息；未注入时为 `None`。
    pub message: Option<Bytes>,
    /// 注入的终态；未注入时由流自行推断。
    pub status: Option<Status>,
}

type Callback = Box<dyn FnOnce(CompletionEvent) + Send + 'static>;

/// 完成标签：标识一次在途的异步操作。
///
/// # 教案式说明
/// - **意图 (Why)**：完成队列只搬运不透明的标签，真正的“完成后做什么”由发起方在构造时登记的回调决定。
/// - **逻辑 (How)**：标签按值流转，传输层持有 → 原始完成队列 → 待决账本 → [`Completion::complete`]；
///   `complete` 消费 `self`，因此同一标签在类型层面只能被完成一次。
/// - **契约 (What)**：
///   - `id` 进程内单调递增，可用于断言到达顺序；
///   - 未完成即被丢弃的标签不会调用回调。
pub struct Completion {
    id: u64,
    kind: OperationKind,
    message: Option<Bytes>,
    status: Option<Status>,
    callback: Option<Callback>,
}

impl Completion {
    pub fn new<F>(kind: OperationKind, callback: F) -> Self
    where
        F: FnOnce(CompletionEvent) + Send + 'static,
    {
        Self {
            id: NEXT_COMPLETION_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            message: None,
            status: None,
            callback: Some(Box::new(callback)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// 注入读操作返回的消息。
    pub fn set_message(&mut self, message: Bytes) {
        self.message = Some(message);
    }

    /// 注入该操作对应的终态。
    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    /// 以给定结果完成操作，在当前线程上调用回调。
    pub fn complete(mut self, ok: bool) {
        let event = CompletionEvent {
            id: self.id,
            kind: self.kind,
            ok,
            message: self.message.take(),
            status: self.status.take(),
        };
        if let Some(callback) = self.callback.take() {
            tracing::trace!(id = event.id, kind = %event.kind, ok, "completion resolved");
            callback(event);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            tracing::trace!(id = self.id, kind = %self.kind, "completion dropped unresolved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn complete_passes_injected_payload_to_callback() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut completion = Completion::new(OperationKind::Read, move |event| {
            *sink.lock() = Some((event.kind, event.ok, event.message, event.status));
        });
        completion.set_message(Bytes::from_static(b"doc"));
        completion.set_status(Status::ok());
        completion.complete(true);

        let (kind, ok, message, status) = seen.lock().take().expect("回调应被调用");
        assert_eq!(kind, OperationKind::Read);
        assert!(ok);
        assert_eq!(message, Some(Bytes::from_static(b"doc")));
        assert_eq!(status, Some(Status::ok()));
    }

    #[test]
    fn ids_increase_in_creation_order() {
        let first = Completion::new(OperationKind::Start, |_| {});
        let second = Completion::new(OperationKind::Write, |_| {});
        assert!(second.id() > first.id());
    }

    #[test]
    fn dropping_unresolved_completion_skips_callback() {
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        drop(Completion::new(OperationKind::Finish, move |_| {
            *flag.lock() = true;
        }));
        assert!(!*called.lock());
    }
}
