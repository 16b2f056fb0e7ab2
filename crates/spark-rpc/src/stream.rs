//! 双向流。
//!
//! # 教案式综述
//! - **意图 (Why)**：把调用上的 start/read/write/finish 完成事件翻译成观察者可理解的流事件。
//! - **结构 (How)**：每个发起的操作都携带一个只持有 `Weak` 引用的完成回调；回调在串行工作队列上执行，
//!   先在状态锁内推进状态机，释放锁后再通知观察者，观察者因此可以在回调中继续调用流的方法。
//! - **契约 (What)**：
//!   - 状态单向推进：`Initial → Starting → Open → Finishing → Finished`；
//!   - 观察者恰好收到一次 `on_stream_finish`，此后到达的完成一律忽略；
//!   - 流被丢弃后，残留完成的回调不再产生任何效果。

use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::async_queue::AsyncQueue;
use crate::channel::{CallContext, FakeCall};
use crate::completion::{Completion, CompletionEvent, OperationKind};
use crate::error::{Result, RpcError};
use crate::status::Status;

/// 流事件的接收方。回调总是在串行工作队列上触发。
pub trait StreamObserver: Send + Sync {
    fn on_stream_start(&self);

    fn on_stream_read(&self, message: Bytes);

    fn on_stream_write(&self) {}

    fn on_stream_finish(&self, status: Status);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Initial,
    Starting,
    Open,
    Finishing,
    Finished,
}

impl StreamState {
    const fn as_str(self) -> &'static str {
        match self {
            StreamState::Initial => "initial",
            StreamState::Starting => "starting",
            StreamState::Open => "open",
            StreamState::Finishing => "finishing",
            StreamState::Finished => "finished",
        }
    }
}

/// 基于模拟调用的双向流。
pub struct Stream {
    shared: Arc<StreamShared>,
}

pub(crate) struct WeakStream {
    shared: Weak<StreamShared>,
}

struct StreamShared {
    context: CallContext,
    call: FakeCall,
    worker_queue: Arc<AsyncQueue>,
    observer: Arc<dyn StreamObserver>,
    state: Mutex<StreamState>,
}

impl Stream {
    pub fn new(
        context: CallContext,
        call: FakeCall,
        worker_queue: Arc<AsyncQueue>,
        observer: Arc<dyn StreamObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(StreamShared {
                context,
                call,
                worker_queue,
                observer,
                state: Mutex::new(StreamState::Initial),
            }),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    pub fn context(&self) -> &CallContext {
        &self.shared.context
    }

    pub fn call(&self) -> &FakeCall {
        &self.shared.call
    }

    /// 发起 start 操作。
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if *state != StreamState::Initial {
            return Err(invalid("start", *state));
        }
        *state = StreamState::Starting;
        drop(state);
        tracing::debug!(call = self.shared.context.id(), "stream starting");
        self.shared.call.start(self.shared.completion(OperationKind::Start));
        Ok(())
    }

    /// 发起写操作；允许在 start 完成前排队。
    pub fn write(&self, message: Bytes) -> Result<()> {
        let state = *self.shared.state.lock();
        if !matches!(state, StreamState::Starting | StreamState::Open) {
            return Err(invalid("write", state));
        }
        self.shared
            .call
            .write(message, self.shared.completion(OperationKind::Write));
        Ok(())
    }

    /// 发起 finish 操作，完成后观察者收到最终状态。
    pub fn finish(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !matches!(*state, StreamState::Starting | StreamState::Open) {
            return Err(invalid("finish", *state));
        }
        *state = StreamState::Finishing;
        drop(state);
        self.shared
            .call
            .finish(self.shared.completion(OperationKind::Finish));
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> WeakStream {
        WeakStream {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl WeakStream {
    pub(crate) fn upgrade(&self) -> Option<Stream> {
        self.shared.upgrade().map(|shared| Stream { shared })
    }
}

impl StreamShared {
    fn completion(self: &Arc<Self>, kind: OperationKind) -> Completion {
        let stream = Arc::downgrade(self);
        Completion::new(kind, move |event| {
            if let Some(stream) = stream.upgrade() {
                stream.on_completion(event);
            }
        })
    }

    fn on_completion(self: &Arc<Self>, event: CompletionEvent) {
        debug_assert!(
            self.worker_queue.is_current_queue(),
            "stream completions must run on the worker queue"
        );
        let mut state = self.state.lock();
        if *state == StreamState::Finished {
            tracing::debug!(
                id = event.id,
                kind = %event.kind,
                "completion ignored: stream finished"
            );
            return;
        }

        if !event.ok {
            *state = StreamState::Finished;
            drop(state);
            let status = event.status.unwrap_or_else(|| self.failure_status());
            tracing::debug!(kind = %event.kind, %status, "stream operation failed");
            self.observer.on_stream_finish(status);
            return;
        }

        match event.kind {
            OperationKind::Start => {
                if *state == StreamState::Starting {
                    *state = StreamState::Open;
                }
                drop(state);
                self.observer.on_stream_start();
                self.read_next();
            }
            OperationKind::Read => {
                drop(state);
                self.observer
                    .on_stream_read(event.message.unwrap_or_default());
                self.read_next();
            }
            OperationKind::Write => {
                drop(state);
                self.observer.on_stream_write();
            }
            OperationKind::Finish => {
                *state = StreamState::Finished;
                drop(state);
                let status = event.status.unwrap_or_else(|| self.call.status());
                tracing::debug!(%status, "stream finished");
                self.observer.on_stream_finish(status);
            }
        }
    }

    fn read_next(self: &Arc<Self>) {
        if *self.state.lock() != StreamState::Open {
            return;
        }
        self.call.read(self.completion(OperationKind::Read));
    }

    fn failure_status(&self) -> Status {
        if self.context.is_cancelled() {
            self.call.status()
        } else {
            Status::unavailable("stream operation failed")
        }
    }
}

fn invalid(operation: &'static str, state: StreamState) -> RpcError {
    RpcError::InvalidState {
        operation,
        state: state.as_str(),
    }
}
