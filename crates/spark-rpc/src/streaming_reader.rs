use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::async_queue::AsyncQueue;
use crate::channel::{CallContext, FakeCall};
use crate::error::Result;
use crate::status::Status;
use crate::stream::{Stream, StreamObserver, StreamState, WeakStream};

type ReaderCallback = Box<dyn FnOnce(std::result::Result<Vec<Bytes>, Status>) + Send + 'static>;

/// 只读流：写出一次请求，收集全部响应，结束时一次性回调。
///
/// # 契约说明（What）
/// - start 成功后立即写出构造时给定的请求；
/// - 每条读到的消息按到达顺序累积；
/// - 流结束时回调恰好被调用一次：终态为 OK 时交付全部响应，否则交付终态。
pub struct StreamingReader {
    stream: Stream,
    observer: Arc<ReaderObserver>,
}

struct ReaderObserver {
    request: Bytes,
    stream: Mutex<Option<WeakStream>>,
    responses: Mutex<Vec<Bytes>>,
    callback: Mutex<Option<ReaderCallback>>,
}

impl StreamingReader {
    pub fn new(
        context: CallContext,
        call: FakeCall,
        worker_queue: Arc<AsyncQueue>,
        request: Bytes,
    ) -> Self {
        let observer = Arc::new(ReaderObserver {
            request,
            stream: Mutex::new(None),
            responses: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
        });
        let stream = Stream::new(
            context,
            call,
            worker_queue,
            Arc::clone(&observer) as Arc<dyn StreamObserver>,
        );
        *observer.stream.lock() = Some(stream.downgrade());
        Self { stream, observer }
    }

    /// 启动读取；`callback` 在流结束时于工作队列上被调用。
    pub fn start<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(std::result::Result<Vec<Bytes>, Status>) + Send + 'static,
    {
        *self.observer.callback.lock() = Some(Box::new(callback));
        self.stream.start()
    }

    pub fn state(&self) -> StreamState {
        self.stream.state()
    }

    pub fn context(&self) -> &CallContext {
        self.stream.context()
    }

    pub fn call(&self) -> &FakeCall {
        self.stream.call()
    }
}

impl StreamObserver for ReaderObserver {
    fn on_stream_start(&self) {
        let stream = self.stream.lock().as_ref().and_then(WeakStream::upgrade);
        if let Some(stream) = stream {
            if let Err(err) = stream.write(self.request.clone()) {
                tracing::warn!(code = err.code(), "streaming reader failed to write request");
            }
        }
    }

    fn on_stream_read(&self, message: Bytes) {
        self.responses.lock().push(message);
    }

    fn on_stream_finish(&self, status: Status) {
        let Some(callback) = self.callback.lock().take() else {
            return;
        };
        if status.is_ok() {
            let responses = std::mem::take(&mut *self.responses.lock());
            tracing::debug!(responses = responses.len(), "streaming reader completed");
            callback(Ok(responses));
        } else {
            tracing::debug!(%status, "streaming reader failed");
            callback(Err(status));
        }
    }
}
