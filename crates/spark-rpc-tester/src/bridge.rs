//! 完成通知桥。
//!
//! # 教案式综述
//! - **意图 (Why)**：模拟传输层在自己的线程上产生完成，被测客户端却只信任串行工作队列逐个交付的回调。
//!   桥把两者解耦：专属轮询线程阻塞拉取原始完成队列，再把每个标签作为一个单元转交工作队列，
//!   由该单元把标签追加进待决账本。
//! - **结构 (How)**：
//!   1. 轮询线程只做“拉取 → 提交追加单元 → 计数”三件事，不解释结果位、不过滤、不重排；
//!   2. `forwarded` 计数器配合 `Condvar` 提供“已转交数量”的等待点，控制器据此建立先后关系；
//!   3. 账本放在 [`QueueConfined`] 中，每次访问都核对当前线程是否为工作线程。
//! - **契约 (What)**：
//!   - 原始队列的到达顺序即账本顺序，端到端 FIFO；
//!   - `shutdown` 幂等；任何一次调用返回时轮询线程都已退出、其提交的追加单元已全部执行，
//!     此后账本不再被本桥改动。并发的后到调用会等待先到调用完成收尾。

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use spark_rpc::{AsyncQueue, CompletionQueue, OperationKind, QueueConfined};

use crate::error::TesterError;
use crate::ledger::{CompletionEndState, CompletionOutcome, PendingCompletions};

/// 桥的生命周期，单向迁移 `Running → ShuttingDown → Shutdown`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// 原始完成队列到串行工作队列的转发桥。
pub struct CompletionBridge {
    raw_queue: Arc<CompletionQueue>,
    worker_queue: Arc<AsyncQueue>,
    ledger: Arc<QueueConfined<PendingCompletions>>,
    forwarded: Arc<ForwardCounter>,
    poller: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<BridgeState>,
    state_changed: Condvar,
}

#[derive(Default)]
struct ForwardCounter {
    total: Mutex<u64>,
    advanced: Condvar,
}

impl ForwardCounter {
    fn advance(&self) {
        *self.total.lock() += 1;
        self.advanced.notify_all();
    }

    fn get(&self) -> u64 {
        *self.total.lock()
    }

    fn wait_for(&self, target: u64) {
        let mut total = self.total.lock();
        while *total < target {
            self.advanced.wait(&mut total);
        }
    }
}

impl CompletionBridge {
    /// 创建原始完成队列并启动唯一的轮询线程。
    pub fn start(
        worker_queue: Arc<AsyncQueue>,
        poller_name: impl Into<String>,
    ) -> Result<Self, TesterError> {
        let poller_name = poller_name.into();
        let raw_queue = Arc::new(CompletionQueue::new());
        let ledger = Arc::new(QueueConfined::new(&worker_queue, PendingCompletions::new()));
        let forwarded = Arc::new(ForwardCounter::default());

        let poller = {
            let raw_queue = Arc::clone(&raw_queue);
            let worker_queue = Arc::clone(&worker_queue);
            let ledger = Arc::clone(&ledger);
            let forwarded = Arc::clone(&forwarded);
            thread::Builder::new()
                .name(poller_name.clone())
                .spawn(move || poll_completions(&raw_queue, &worker_queue, &ledger, &forwarded))
                .map_err(|source| TesterError::PollerSpawn {
                    thread: poller_name.clone(),
                    source,
                })?
        };
        tracing::debug!(
            poller = %poller_name,
            queue = worker_queue.name(),
            "completion bridge running"
        );

        Ok(Self {
            raw_queue,
            worker_queue,
            ledger,
            forwarded,
            poller: Mutex::new(Some(poller)),
            state: Mutex::new(BridgeState::Running),
            state_changed: Condvar::new(),
        })
    }

    /// 供模拟调用绑定的原始完成队列。
    pub fn raw_queue(&self) -> &Arc<CompletionQueue> {
        &self.raw_queue
    }

    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    /// 已提交追加单元的标签总数。
    pub fn forwarded_total(&self) -> u64 {
        self.forwarded.get()
    }

    /// 阻塞直到至少 `target` 个标签的追加单元已提交到工作队列。
    ///
    /// 之后提交到工作队列的任何单元都排在这些追加单元之后。
    pub fn settle(&self, target: u64) {
        self.forwarded.wait_for(target);
    }

    /// 在工作队列上依序决议最旧的 `outcomes.len()` 个完成，并等待其生效。
    pub fn run_completions(&self, outcomes: &[CompletionOutcome]) -> Result<(), TesterError> {
        let outcomes = outcomes.to_vec();
        self.apply(move |pending| pending.resolve(&outcomes))
    }

    /// 同 [`Self::run_completions`]，按 [`CompletionEndState`] 决议。
    pub fn run_end_states(&self, end_states: &[CompletionEndState]) -> Result<(), TesterError> {
        let end_states = end_states.to_vec();
        self.apply(move |pending| pending.resolve_with(&end_states))
    }

    /// 当前待决数量；在此之前提交的全部单元都已执行。
    pub fn pending_len(&self) -> Result<usize, TesterError> {
        let ledger = Arc::clone(&self.ledger);
        Ok(self
            .worker_queue
            .enqueue_blocking(move || ledger.with(|pending| pending.len()))?)
    }

    pub fn pending_kinds(&self) -> Result<Vec<OperationKind>, TesterError> {
        let ledger = Arc::clone(&self.ledger);
        Ok(self
            .worker_queue
            .enqueue_blocking(move || ledger.with(|pending| pending.kinds()))?)
    }

    /// 关闭桥；重复调用无副作用。
    ///
    /// 只有首个调用执行收尾；其余调用阻塞到状态变为 [`BridgeState::Shutdown`] 后返回。
    ///
    /// # Panics
    /// 在工作线程上调用（等待轮询线程排空会与工作队列互相等待）。
    pub fn shutdown(&self) {
        assert!(
            !self.worker_queue.is_current_queue(),
            "completion bridge must be shut down from outside the worker queue"
        );
        {
            let mut state = self.state.lock();
            match *state {
                BridgeState::Running => *state = BridgeState::ShuttingDown,
                BridgeState::ShuttingDown => {
                    while *state != BridgeState::Shutdown {
                        self.state_changed.wait(&mut state);
                    }
                    return;
                }
                BridgeState::Shutdown => return,
            }
        }
        tracing::debug!("completion bridge shutting down");

        self.raw_queue.shutdown();
        if let Some(poller) = self.poller.lock().take() {
            if poller.join().is_err() {
                tracing::error!("completion poller terminated abnormally");
            }
        }

        if let Some(message) = self.worker_queue.poison_message() {
            tracing::warn!(%message, "worker queue poisoned; skipping drain fence");
        } else {
            let ledger = Arc::clone(&self.ledger);
            match self
                .worker_queue
                .enqueue_blocking(move || ledger.with(|pending| pending.len()))
            {
                Ok(0) => {}
                Ok(unresolved) => {
                    tracing::debug!(
                        unresolved,
                        "completion bridge shut down with unresolved completions"
                    )
                }
                Err(err) => tracing::warn!(code = err.code(), "drain fence rejected"),
            }
        }

        *self.state.lock() = BridgeState::Shutdown;
        self.state_changed.notify_all();
        tracing::debug!("completion bridge shut down");
    }

    fn apply<F>(&self, resolve: F) -> Result<(), TesterError>
    where
        F: FnOnce(&mut PendingCompletions) + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        self.worker_queue.enqueue_relaxed(move || ledger.with(resolve))?;
        self.worker_queue.enqueue_blocking(|| ())?;
        Ok(())
    }
}

impl Drop for CompletionBridge {
    fn drop(&mut self) {
        if !self.worker_queue.is_current_queue() {
            self.shutdown();
        }
    }
}

fn poll_completions(
    raw_queue: &CompletionQueue,
    worker_queue: &AsyncQueue,
    ledger: &Arc<QueueConfined<PendingCompletions>>,
    forwarded: &ForwardCounter,
) {
    while let Some((completion, raw_ok)) = raw_queue.next() {
        tracing::trace!(
            id = completion.id(),
            kind = %completion.kind(),
            raw_ok,
            "forwarding completion"
        );
        let ledger = Arc::clone(ledger);
        let append = move || ledger.with(|pending| pending.push(completion));
        if let Err(err) = worker_queue.enqueue(append) {
            tracing::warn!(code = err.code(), "completion dropped: worker queue unavailable");
        }
        forwarded.advance();
    }
    tracing::debug!("completion poller exited");
}
