//! 在不借助测试桥的情况下手工驱动完成队列，校验流与只读流的状态机。
//!
//! 每个用例先取消调用，让全部在途操作进入原始完成队列，再在工作队列上逐个完成，
//! 从而精确控制观察者看到的事件序列。

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use spark_rpc::{
    AsyncQueue, CallContext, Completion, CompletionQueue, FakeChannel, OperationKind, RpcError,
    Status, StatusCode, Stream, StreamObserver, StreamState, StreamingReader,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Start,
    Read(Bytes),
    Write,
    Finish(StatusCode),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl StreamObserver for Recorder {
    fn on_stream_start(&self) {
        self.events.lock().push(Event::Start);
    }

    fn on_stream_read(&self, message: Bytes) {
        self.events.lock().push(Event::Read(message));
    }

    fn on_stream_write(&self) {
        self.events.lock().push(Event::Write);
    }

    fn on_stream_finish(&self, status: Status) {
        self.events.lock().push(Event::Finish(status.code()));
    }
}

struct Rig {
    queue: Arc<CompletionQueue>,
    worker: Arc<AsyncQueue>,
    channel: FakeChannel,
    drained: u64,
}

impl Rig {
    fn new(name: &str) -> Self {
        Self {
            queue: Arc::new(CompletionQueue::new()),
            worker: Arc::new(AsyncQueue::new(name).expect("工作线程应创建成功")),
            channel: FakeChannel::new("fake:0"),
            drained: 0,
        }
    }

    fn stream(&self, observer: Arc<Recorder>) -> Stream {
        let context = CallContext::new();
        let call = self.channel.prepare_call(&context, "/spark.Test/Stream", &self.queue);
        Stream::new(context, call, Arc::clone(&self.worker), observer)
    }

    /// 取出下一个已入队标签；调用前必须确认队列中确有条目。
    fn take(&mut self) -> Completion {
        assert!(self.queue.pushed_total() > self.drained, "完成队列中没有待取条目");
        self.drained += 1;
        self.queue.next().expect("队列未关闭").0
    }

    fn complete(&self, completion: Completion, ok: bool) {
        self.worker
            .enqueue_blocking(move || completion.complete(ok))
            .expect("工作队列运行中");
    }
}

#[test]
fn start_success_then_read_failure_reports_cancelled_status() {
    let mut rig = Rig::new("stream-start-read");
    let recorder = Arc::new(Recorder::default());
    let stream = rig.stream(Arc::clone(&recorder));

    stream.start().expect("初始状态允许 start");
    assert!(stream.context().cancel());

    let start = rig.take();
    assert_eq!(start.kind(), OperationKind::Start);
    rig.complete(start, true);
    assert_eq!(stream.state(), StreamState::Open);

    let read = rig.take();
    assert_eq!(read.kind(), OperationKind::Read, "start 成功后应自动发起读");
    rig.complete(read, false);

    assert_eq!(
        recorder.events(),
        vec![Event::Start, Event::Finish(StatusCode::Cancelled)]
    );
    assert_eq!(stream.state(), StreamState::Finished);
}

#[test]
fn misuse_is_reported_as_invalid_state() {
    let rig = Rig::new("stream-misuse");
    let stream = rig.stream(Arc::new(Recorder::default()));

    let err = stream
        .write(Bytes::from_static(b"early"))
        .expect_err("start 之前不允许写");
    assert_eq!(err.code(), "spark.rpc.invalid_state");
    assert!(matches!(stream.finish(), Err(RpcError::InvalidState { .. })));

    stream.start().expect("初始状态允许 start");
    assert!(stream.start().is_err(), "重复 start 必须被拒绝");
}

#[test]
fn completions_after_finish_are_ignored() {
    let mut rig = Rig::new("stream-after-finish");
    let recorder = Arc::new(Recorder::default());
    let stream = rig.stream(Arc::clone(&recorder));

    stream.start().expect("初始状态允许 start");
    stream.write(Bytes::from_static(b"w")).expect("starting 状态允许写");
    stream.finish().expect("starting 状态允许 finish");
    stream.context().cancel();

    let start = rig.take();
    let write = rig.take();
    let finish = rig.take();
    assert_eq!(
        [start.kind(), write.kind(), finish.kind()],
        [OperationKind::Start, OperationKind::Write, OperationKind::Finish]
    );

    rig.complete(start, true);
    rig.complete(finish, true);
    rig.complete(write, true);

    assert_eq!(
        recorder.events(),
        vec![Event::Start, Event::Finish(StatusCode::Cancelled)],
        "finish 之后的写完成不得再通知观察者"
    );
}

#[test]
fn dropped_stream_ignores_late_completions() {
    let mut rig = Rig::new("stream-dropped");
    let recorder = Arc::new(Recorder::default());
    let stream = rig.stream(Arc::clone(&recorder));
    stream.start().expect("初始状态允许 start");
    let context = stream.context().clone();
    drop(stream);

    context.cancel();
    let start = rig.take();
    rig.complete(start, true);
    assert!(recorder.events().is_empty());
}

#[test]
fn streaming_reader_collects_responses_until_clean_end() {
    let mut rig = Rig::new("reader-happy");
    let context = CallContext::new();
    let call = rig.channel.prepare_call(&context, "/spark.Test/Read", &rig.queue);
    let reader = StreamingReader::new(
        context,
        call,
        Arc::clone(&rig.worker),
        Bytes::from_static(b"query"),
    );

    let outcome = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&outcome);
    reader
        .start(move |result| *sink.lock() = Some(result))
        .expect("初始状态允许 start");
    reader.context().cancel();

    let start = rig.take();
    rig.complete(start, true);

    let write = rig.take();
    assert_eq!(write.kind(), OperationKind::Write, "start 成功后先写出请求");
    let mut read = rig.take();
    assert_eq!(read.kind(), OperationKind::Read);
    rig.complete(write, true);

    read.set_message(Bytes::from_static(b"doc-1"));
    rig.complete(read, true);

    let mut end = rig.take();
    end.set_status(Status::ok());
    rig.complete(end, false);

    let result = outcome.lock().take().expect("流结束时必须回调");
    assert_eq!(result, Ok(vec![Bytes::from_static(b"doc-1")]));
    assert_eq!(reader.call().written_messages(), vec![Bytes::from_static(b"query")]);
}

#[test]
fn streaming_reader_reports_failed_start() {
    let mut rig = Rig::new("reader-failed-start");
    let context = CallContext::new();
    let call = rig.channel.prepare_call(&context, "/spark.Test/Read", &rig.queue);
    let reader = StreamingReader::new(context, call, Arc::clone(&rig.worker), Bytes::new());

    let outcome = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&outcome);
    reader
        .start(move |result| *sink.lock() = Some(result))
        .expect("初始状态允许 start");
    reader.context().cancel();

    let start = rig.take();
    rig.complete(start, false);

    let status = outcome
        .lock()
        .take()
        .expect("start 失败也必须回调")
        .expect_err("start 失败应交付错误终态");
    assert_eq!(status.code(), StatusCode::Cancelled);
    assert!(reader.call().written_messages().is_empty());
}
