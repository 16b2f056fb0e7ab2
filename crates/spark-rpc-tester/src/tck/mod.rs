//! 测试器契约套件（TCK）。
//!
//! # 教案式综述
//! - **意图 (Why)**：强制结束的顺序、取消幂等与关闭语义是测试器对所有下游测试的承诺；
//!   把它们固化为可复用套件，替换完成队列或工作队列实现时可以一次性回归。
//! - **结构 (How)**：每个主题模块导出一个 `'static` [`TckSuite`]，[`run_suite`] 逐个执行用例，
//!   失败时附加“套件/用例”上下文后重新 panic。
//! - **契约 (What)**：用例失败必须 panic；每个用例自行创建并销毁测试器，互不共享状态。

mod cancellation;
mod ordering;
mod reader;
mod shutdown;

use std::any::Any;
use std::panic;

const ALL_SUITES: [&TckSuite; 4] = [
    ordering::suite(),
    cancellation::suite(),
    shutdown::suite(),
    reader::suite(),
];

/// 单个 TCK 用例。
#[derive(Clone, Copy)]
pub struct TckCase {
    pub name: &'static str,
    /// 失败时 panic。
    pub test: fn(),
}

/// 同一主题的一组用例。
#[derive(Clone, Copy)]
pub struct TckSuite {
    pub name: &'static str,
    pub cases: &'static [TckCase],
}

/// 在捕获 panic 的前提下执行整个套件。
///
/// # Panics
/// 套件为空，或任一用例失败（消息带 `[spark-rpc-tester::套件::用例]` 前缀）。
pub fn run_suite(suite: &TckSuite) {
    assert!(!suite.cases.is_empty(), "TCK 套件不应为空");
    for case in suite.cases {
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| (case.test)()));
        if let Err(payload) = outcome {
            rethrow_with_case(suite, case, payload);
        }
    }
}

fn rethrow_with_case(suite: &TckSuite, case: &TckCase, payload: Box<dyn Any + Send>) -> ! {
    let detail = match payload.downcast::<String>() {
        Ok(text) => *text,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "<未知 panic 类型>".to_owned(), |text| (*text).to_owned()),
    };
    panic::resume_unwind(Box::new(format!(
        "[spark-rpc-tester::{}::{}] 测试失败：{detail}",
        suite.name, case.name
    )));
}

/// 按固定顺序返回全部套件。
pub fn all_suites() -> &'static [&'static TckSuite] {
    &ALL_SUITES
}

/// 完成按 FIFO 顺序、以请求的结果交付。
pub fn run_ordering_suite() {
    run_suite(ordering::suite());
}

/// 取消幂等，重复强制结束不重复上报。
pub fn run_cancellation_suite() {
    run_suite(cancellation::suite());
}

pub fn run_shutdown_suite() {
    run_suite(shutdown::suite());
}

/// 只读流在成功与失败路径上恰好回调一次。
pub fn run_reader_suite() {
    run_suite(reader::suite());
}
