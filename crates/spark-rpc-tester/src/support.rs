//! 测试辅助：记录型观察者与通用收集器。

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use spark_rpc::{Status, StreamObserver};

/// [`RecordingObserver`] 记录下的单个流事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Start,
    Read(Bytes),
    Write,
    Finish(Status),
}

/// 按到达顺序记录全部流事件的观察者。
///
/// # 教案式说明
/// - **意图 (Why)**：强制结束的断言几乎都是“观察者恰好看到了这些事件”，统一记录器避免每个测试重复实现观察者。
/// - **逻辑 (How)**：事件追加到 `parking_lot::Mutex<Vec<_>>`；回调只在工作线程上触发，锁不会被争用。
/// - **契约 (What)**：[`RecordingObserver::events`] 返回快照，不会清空记录。
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    /// `on_stream_finish` 被调用的次数。
    pub fn finish_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, StreamEvent::Finish(_)))
            .count()
    }

    fn record(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}

impl StreamObserver for RecordingObserver {
    fn on_stream_start(&self) {
        self.record(StreamEvent::Start);
    }

    fn on_stream_read(&self, message: Bytes) {
        self.record(StreamEvent::Read(message));
    }

    fn on_stream_write(&self) {
        self.record(StreamEvent::Write);
    }

    fn on_stream_finish(&self, status: Status) {
        self.record(StreamEvent::Finish(status));
    }
}

/// 创建线程安全的 `Vec` 收集器，供回调跨线程记录结果。
pub fn shared_vec<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

