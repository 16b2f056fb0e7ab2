#![deny(unsafe_code)]
//! spark-rpc：基于完成队列通知的流式 RPC 客户端运行时。
//!
//! # 模块结构
//! - [`completion`]：完成标签与回调事件；
//! - [`completion_queue`]：原始完成队列，传输层推入、轮询方阻塞拉取；
//! - [`async_queue`]：串行工作队列，所有回调与共享状态变更都在其上执行；
//! - [`channel`]：模拟信道、可取消调用上下文与模拟调用；
//! - [`stream`] / [`streaming_reader`]：面向调用方的双向流与只读流；
//! - [`status`] / [`error`]：调用终态与可恢复错误。
//!
//! 模拟信道没有真实对端：挂起的操作只有在调用被取消后才会以失败结果进入完成队列，
//! 测试代码据此精确控制每个操作何时、以何种结果完成。

pub mod async_queue;
pub mod channel;
pub mod completion;
pub mod completion_queue;
pub mod error;
pub mod status;
pub mod stream;
pub mod streaming_reader;

pub use async_queue::{AsyncQueue, QueueConfined};
pub use channel::{CallContext, CallState, FakeCall, FakeChannel};
pub use completion::{Completion, CompletionEvent, OperationKind};
pub use completion_queue::CompletionQueue;
pub use error::{Result, RpcError};
pub use status::{Status, StatusCode};
pub use stream::{Stream, StreamObserver, StreamState};
pub use streaming_reader::StreamingReader;
