#![deny(unsafe_code)]
//! spark-rpc-tester：基于模拟完成队列的确定性流测试器。
//!
//! # 模块结构
//! - [`bridge`]：完成通知桥，专属轮询线程把原始完成队列上的标签转交串行工作队列；
//! - [`ledger`]：待决完成账本与决议请求；
//! - [`tester`]：[`StreamTester`]，构造挂在模拟信道上的流，并强制结束其在途操作；
//! - [`config`] / [`logging`] / [`error`]：配置、测试日志与错误；
//! - [`support`] / [`tck`]：记录型观察者与可复用的契约套件。
//!
//! # 典型用法
//! ```
//! use std::sync::Arc;
//! use spark_rpc_tester::{CompletionOutcome, RecordingObserver, StreamEvent, StreamTester};
//!
//! let tester = StreamTester::new()?;
//! let observer = RecordingObserver::new();
//! let stream = tester.create_stream(observer.clone());
//! stream.start()?;
//!
//! tester.force_finish(&[CompletionOutcome::Ok])?;
//! assert_eq!(observer.events(), vec![StreamEvent::Start]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod support;
pub mod tck;
pub mod tester;

pub use bridge::{BridgeState, CompletionBridge};
pub use config::TesterConfig;
pub use error::TesterError;
pub use ledger::{CompletionEndState, CompletionOutcome, PendingCompletions};
pub use logging::init_test_logging;
pub use support::{RecordingObserver, StreamEvent, shared_vec};
pub use tester::StreamTester;
