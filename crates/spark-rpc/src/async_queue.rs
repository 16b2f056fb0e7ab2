//! 串行工作队列。
//!
//! # 教案式综述
//! - **意图 (Why)**：流的回调、完成标签的登记与决议都假定“同一时刻只有一个单元在执行、且按提交顺序执行”。
//!   [`AsyncQueue`] 把这一假设落实为一个专属工作线程，所有共享状态的变更都只发生在该线程上。
//! - **结构 (How)**：
//!   1. 提交方经 `tokio::sync::mpsc` 无界通道投递装箱闭包，工作线程以 `blocking_recv` 逐个执行；
//!   2. `enqueue_blocking` 额外携带 `oneshot` 回执，执行完毕后唤醒提交方，构成“入队并等待”的栅栏；
//!   3. 单元 panic 时队列进入中毒态并停止，阻塞中的提交方会带着原始 panic 文案重新 panic。
//! - **契约 (What)**：
//!   - 先提交者先执行，执行互不重叠；
//!   - `enqueue_blocking` 返回时，该单元以及此前提交的全部单元均已执行；
//!   - 在工作线程内调用 `enqueue_blocking` 必然死锁，视为契约违规直接 panic。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, RpcError};

type Operation = Box<dyn FnOnce() + Send + 'static>;

/// 单线程、按序执行的工作队列。
pub struct AsyncQueue {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Operation>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    poisoned: Arc<Mutex<Option<String>>>,
}

impl AsyncQueue {
    /// 以给定线程名启动工作线程。
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Operation>();
        let poisoned = Arc::new(Mutex::new(None));
        let worker_poison = Arc::clone(&poisoned);
        let worker_name = name.clone();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(operation) = receiver.blocking_recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(operation)) {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(
                            queue = %worker_name,
                            %message,
                            "queued operation panicked; queue poisoned"
                        );
                        *worker_poison.lock() = Some(message);
                        break;
                    }
                }
                tracing::debug!(queue = %worker_name, "worker queue drained");
            })
            .map_err(|err| RpcError::WorkerSpawn {
                thread: name.clone(),
                message: err.to_string(),
            })?;
        let worker_id = worker.thread().id();
        tracing::debug!(queue = %name, "worker queue started");

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            worker_id,
            poisoned,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前线程是否为本队列的工作线程。
    pub fn is_current_queue(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// 从队列外部提交单元，不等待执行。
    ///
    /// 在工作线程内部提交请使用 [`Self::enqueue_relaxed`]。
    pub fn enqueue<F>(&self, operation: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(
            !self.is_current_queue(),
            "enqueue called from inside queue `{}`; use enqueue_relaxed",
            self.name
        );
        self.submit(Box::new(operation))
    }

    /// 从任意线程（包括工作线程自身）提交单元，不等待执行。
    pub fn enqueue_relaxed<F>(&self, operation: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(operation))
    }

    /// 提交单元并阻塞到其执行完毕，返回单元的结果。
    ///
    /// # Panics
    /// - 在工作线程上调用；
    /// - 等待期间队列因单元 panic 而中毒，此时携带原始 panic 文案。
    pub fn enqueue_blocking<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        assert!(
            !self.is_current_queue(),
            "enqueue_blocking called from inside queue `{}` would deadlock",
            self.name
        );
        let (done, wait) = oneshot::channel();
        if let Err(err) = self.submit(Box::new(move || {
            let _ = done.send(operation());
        })) {
            self.resurface_poison();
            return Err(err);
        }
        match wait.blocking_recv() {
            Ok(value) => Ok(value),
            Err(_) => {
                self.resurface_poison();
                Err(RpcError::QueueShutdown {
                    queue: "worker queue",
                })
            }
        }
    }

    /// 关闭队列：拒绝后续提交，执行完已提交的单元后回收工作线程。
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        if self.is_current_queue() {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!(queue = %self.name, "worker thread terminated abnormally");
            }
        }
        tracing::debug!(queue = %self.name, "worker queue shut down");
    }

    /// 队列是否因单元 panic 而停止。
    pub fn poison_message(&self) -> Option<String> {
        self.poisoned.lock().clone()
    }

    fn resurface_poison(&self) {
        if let Some(message) = self.poison_message() {
            panic!("queue `{}` poisoned: {message}", self.name);
        }
    }

    fn submit(&self, operation: Operation) -> Result<()> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            tracing::warn!(queue = %self.name, "submission rejected: queue shut down");
            return Err(RpcError::QueueShutdown { queue: "worker queue" });
        };
        sender.send(operation).map_err(|_| {
            tracing::warn!(queue = %self.name, "submission rejected: worker stopped");
            RpcError::QueueShutdown { queue: "worker queue" }
        })
    }
}

impl Drop for AsyncQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 绑定到某个 [`AsyncQueue`] 的状态，只允许在该队列的工作线程上访问。
///
/// # 教案式说明
/// - **意图 (Why)**：闭包跨线程投递要求共享状态 `Sync`，但这类状态的正确性来自“只在工作线程上读写”，
///   而非锁本身；`QueueConfined` 用断言把这条纪律变成可检查的约束。
/// - **逻辑 (How)**：内部的 `parking_lot::Mutex` 永远不会被争用，仅用于满足类型系统；每次访问先核对线程身份。
/// - **契约 (What)**：在非所属线程上调用 [`QueueConfined::with`] 会 panic。
pub struct QueueConfined<T> {
    owner: ThreadId,
    queue_name: String,
    value: Mutex<T>,
}

impl<T> QueueConfined<T> {
    pub fn new(queue: &AsyncQueue, value: T) -> Self {
        Self {
            owner: queue.worker_id,
            queue_name: queue.name.clone(),
            value: Mutex::new(value),
        }
    }

    pub fn with<R>(&self, access: impl FnOnce(&mut T) -> R) -> R {
        assert!(
            thread::current().id() == self.owner,
            "state confined to queue `{}` accessed from another thread",
            self.queue_name
        );
        let mut guard = self.value.lock();
        access(&mut *guard)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_run_in_submission_order() {
        let queue = AsyncQueue::new("test-order").expect("线程创建应成功");
        let log = Arc::new(Mutex::new(Vec::new()));
        for value in 0..16 {
            let log = Arc::clone(&log);
            queue.enqueue(move || log.lock().push(value)).expect("队列运行中");
        }
        queue.enqueue_blocking(|| ()).expect("队列运行中");
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn relaxed_units_submitted_from_worker_run_after_current_unit() {
        let queue = Arc::new(AsyncQueue::new("test-relaxed").expect("线程创建应成功"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_queue = Arc::clone(&queue);
        let inner_log = Arc::clone(&log);
        queue
            .enqueue(move || {
                let nested_log = Arc::clone(&inner_log);
                inner_queue
                    .enqueue_relaxed(move || nested_log.lock().push("nested"))
                    .expect("队列运行中");
                inner_log.lock().push("outer");
            })
            .expect("队列运行中");
        queue.enqueue_blocking(|| ()).expect("队列运行中");
        assert_eq!(*log.lock(), vec!["outer", "nested"]);
    }

    #[test]
    fn enqueue_blocking_returns_value_and_runs_on_worker() {
        let queue = AsyncQueue::new("test-blocking").expect("线程创建应成功");
        let name = queue
            .enqueue_blocking(|| thread::current().name().map(str::to_owned))
            .expect("队列运行中");
        assert_eq!(name.as_deref(), Some("test-blocking"));
        assert!(!queue.is_current_queue());
    }

    #[test]
    fn submissions_after_shutdown_are_rejected() {
        let queue = AsyncQueue::new("test-shutdown").expect("线程创建应成功");
        queue.shutdown();
        queue.shutdown();
        let err = queue.enqueue(|| ()).expect_err("关闭后应拒绝提交");
        assert_eq!(err.code(), "spark.rpc.queue_shutdown");
        assert!(queue.enqueue_blocking(|| ()).is_err());
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn panicking_unit_poisons_queue_and_resurfaces_on_blocking_caller() {
        let queue = AsyncQueue::new("test-poison").expect("线程创建应成功");
        queue.enqueue(|| panic!("boom")).expect("队列运行中");
        let _ = queue.enqueue_blocking(|| ());
    }

    #[test]
    fn confined_state_is_reachable_from_its_queue() {
        let queue = AsyncQueue::new("test-confined").expect("线程创建应成功");
        let state = Arc::new(QueueConfined::new(&queue, 0_u32));
        let inner = Arc::clone(&state);
        let value = queue
            .enqueue_blocking(move || {
                inner.with(|value| *value += 2);
                inner.with(|value| *value)
            })
            .expect("队列运行中");
        assert_eq!(value, 2);
    }

    #[test]
    #[should_panic(expected = "accessed from another thread")]
    fn confined_state_rejects_foreign_thread() {
        let queue = AsyncQueue::new("test-confined-foreign").expect("线程创建应成功");
        let state = QueueConfined::new(&queue, ());
        state.with(|_| ());
    }
}
