//! 流测试器：构造门面 + 强制结束控制器。
//!
//! # 教案式综述
//! - **意图 (Why)**：被测代码只看到“像真的一样”的 [`Stream`] / [`StreamingReader`]；测试代码则需要精确决定
//!   每个挂起操作何时、以何种结果完成。[`StreamTester`] 同时扮演这两侧。
//! - **结构 (How)**：
//!   1. 构造时启动串行工作队列与 [`CompletionBridge`]，所有流共享同一个原始完成队列；
//!   2. `create_*` 为每个流分配新的 [`CallContext`]，并把它记为“当前”调用；
//!   3. `force_finish*` 取消当前调用 → 等待快速失败的标签全部转交 → 在工作队列上决议最旧的 N 个 → 栅栏等待。
//! - **契约 (What)**：
//!   - `force_finish*` 返回时，观察者恰好已看到请求的 N 个完成，顺序与结果一致；
//!   - 决议数量超过已到达数量、操作种类不符、尚未创建任何流即强制结束，都属于场景错误，直接 panic；
//!   - 同一时刻只跟踪一个当前调用：最近创建的流覆盖之前的记录，多流场景由调用方自行保证。

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use spark_rpc::{
    AsyncQueue, CallContext, FakeChannel, OperationKind, Stream, StreamObserver, StreamingReader,
};

use crate::bridge::{BridgeState, CompletionBridge};
use crate::config::TesterConfig;
use crate::error::TesterError;
use crate::ledger::{CompletionEndState, CompletionOutcome};

/// 以确定性方式驱动模拟调用完成的测试器。
pub struct StreamTester {
    config: TesterConfig,
    worker_queue: Arc<AsyncQueue>,
    channel: FakeChannel,
    bridge: CompletionBridge,
    current: Mutex<Option<CallContext>>,
}

impl StreamTester {
    /// 以默认配置创建测试器。
    pub fn new() -> Result<Self, TesterError> {
        Self::with_config(TesterConfig::default())
    }

    pub fn with_config(config: TesterConfig) -> Result<Self, TesterError> {
        let worker_queue = Arc::new(AsyncQueue::new(config.worker_thread_name.clone())?);
        let bridge =
            CompletionBridge::start(Arc::clone(&worker_queue), config.poller_thread_name.clone())?;
        let channel = FakeChannel::new(config.channel_target.clone());
        tracing::debug!(
            worker = %config.worker_thread_name,
            target_addr = %config.channel_target,
            "stream tester ready"
        );
        Ok(Self {
            config,
            worker_queue,
            channel,
            bridge,
            current: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    /// 被测流共享的串行工作队列。
    pub fn worker_queue(&self) -> &Arc<AsyncQueue> {
        &self.worker_queue
    }

    pub fn channel(&self) -> &FakeChannel {
        &self.channel
    }

    pub fn bridge_state(&self) -> BridgeState {
        self.bridge.state()
    }

    /// 创建绑定到模拟调用的双向流，并将其调用记为当前调用。
    pub fn create_stream(&self, observer: Arc<dyn StreamObserver>) -> Stream {
        let context = self.begin_call();
        let call = self
            .channel
            .prepare_call(&context, self.config.method.as_str(), self.bridge.raw_queue());
        Stream::new(context, call, Arc::clone(&self.worker_queue), observer)
    }

    /// 创建请求为空的只读流，并将其调用记为当前调用。
    pub fn create_streaming_reader(&self) -> StreamingReader {
        let context = self.begin_call();
        let call = self
            .channel
            .prepare_call(&context, self.config.method.as_str(), self.bridge.raw_queue());
        StreamingReader::new(context, call, Arc::clone(&self.worker_queue), Bytes::new())
    }

    /// 当前被跟踪的调用上下文。
    pub fn current_context(&self) -> Option<CallContext> {
        self.current.lock().clone()
    }

    /// 取消当前调用，并以 `outcomes` 依序决议最旧的待决完成。
    ///
    /// # Panics
    /// - 尚未创建任何流；
    /// - 已到达的完成少于 `outcomes.len()`。
    pub fn force_finish(&self, outcomes: &[CompletionOutcome]) -> Result<(), TesterError> {
        self.cancel_and_settle(outcomes.len());
        self.bridge.run_completions(outcomes)
    }

    /// 同 [`Self::force_finish`]，额外校验操作种类并注入消息与终态。
    ///
    /// # Panics
    /// 同 [`Self::force_finish`]；另外任一完成的操作种类与期望不符时 panic，且不决议任何完成。
    pub fn force_finish_with(&self, end_states: &[CompletionEndState]) -> Result<(), TesterError> {
        self.cancel_and_settle(end_states.len());
        self.bridge.run_end_states(end_states)
    }

    /// 不决议任何完成，只等待已入队的标签全部进入账本。
    ///
    /// 已取消调用上新发起的操作会立即失败入队，决议它们之前先调用本方法。
    pub fn keep_polling(&self) -> Result<(), TesterError> {
        self.settle();
        self.worker_queue.enqueue_blocking(|| ())?;
        Ok(())
    }

    /// 当前待决的完成数量。
    pub fn pending_completions(&self) -> Result<usize, TesterError> {
        self.settle();
        self.bridge.pending_len()
    }

    /// 当前待决完成的操作种类，按到达顺序。
    pub fn pending_kinds(&self) -> Result<Vec<OperationKind>, TesterError> {
        self.settle();
        self.bridge.pending_kinds()
    }

    /// 关闭完成桥；重复调用无副作用。
    pub fn shutdown(&self) {
        self.bridge.shutdown();
    }

    fn begin_call(&self) -> CallContext {
        let context = CallContext::new();
        if let Some(previous) = self.current.lock().replace(context.clone()) {
            tracing::debug!(
                previous = previous.id(),
                current = context.id(),
                "current call replaced"
            );
        }
        context
    }

    fn cancel_and_settle(&self, requested: usize) {
        let Some(context) = self.current_context() else {
            panic!("force_finish requires a stream created by this tester");
        };
        let first = context.cancel();
        tracing::debug!(
            call = context.id(),
            first_cancel = first,
            requested,
            "force finishing call"
        );
        self.settle();
    }

    fn settle(&self) {
        self.bridge.settle(self.bridge.raw_queue().pushed_total());
    }
}

impl Drop for StreamTester {
    fn drop(&mut self) {
        if self.worker_queue.is_current_queue() {
            tracing::warn!(
                "stream tester dropped on its worker queue; shutdown deferred to queue drop"
            );
            return;
        }
        self.bridge.shutdown();
        self.worker_queue.shutdown();
    }
}
