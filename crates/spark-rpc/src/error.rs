use thiserror::Error;

/// `spark-rpc` 运行时中可恢复的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：完成队列、串行工作队列与流在“已关闭/状态不符”时需要把失败交还调用方，
///   而不是直接 panic；真正的契约违规（例如在工作线程上阻塞等待自身）仍以断言处理。
/// - **契约 (What)**：每个变体都映射到稳定的 `code()`，日志与测试按码断言。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// 目标队列已关闭，不再接受新的提交。
    #[error("{queue} has been shut down")]
    QueueShutdown { queue: &'static str },
    /// 工作线程创建失败。
    #[error("failed to spawn worker thread `{thread}`: {message}")]
    WorkerSpawn { thread: String, message: String },
    /// 流当前状态不允许执行该操作。
    #[error("invalid stream state for {operation}: {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

impl RpcError {
    pub const fn code(&self) -> &'static str {
        match self {
            RpcError::QueueShutdown { .. } => "spark.rpc.queue_shutdown",
            RpcError::WorkerSpawn { .. } => "spark.rpc.worker_spawn_failed",
            RpcError::InvalidState { .. } => "spark.rpc.invalid_state",
        }
    }
}

pub type Result<T, E = RpcError> = core::result::Result<T, E>;
