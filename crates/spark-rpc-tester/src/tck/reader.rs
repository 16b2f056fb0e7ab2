use bytes::Bytes;
use spark_rpc::{OperationKind, Status, StatusCode};

use super::{TckCase, TckSuite};
use crate::ledger::{CompletionEndState, CompletionOutcome};
use crate::support::shared_vec;
use crate::tester::StreamTester;

const CASES: &[TckCase] = &[
    TckCase {
        name: "failed_start_is_reported_once",
        test: failed_start_is_reported_once,
    },
    TckCase {
        name: "responses_are_collected_until_clean_end",
        test: responses_are_collected_until_clean_end,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "reader",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn failed_start_is_reported_once() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let results = shared_vec();
    let sink = results.clone();
    let reader = tester.create_streaming_reader();
    reader
        .start(move |result| sink.lock().push(result))
        .expect("初始状态允许 start");

    tester.force_finish(&[CompletionOutcome::Error]).expect("工作队列运行中");

    let results = results.lock();
    assert_eq!(results.len(), 1, "回调必须恰好触发一次");
    let status = results[0].as_ref().expect_err("start 失败应交付错误终态");
    assert_eq!(status.code(), StatusCode::Cancelled);
    assert!(reader.call().written_messages().is_empty(), "start 失败后不得写出请求");
}

/// start 成功 → 写出空请求 → 读到一条消息 → 对端以 OK 结束。
fn responses_are_collected_until_clean_end() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let results = shared_vec();
    let sink = results.clone();
    let reader = tester.create_streaming_reader();
    reader
        .start(move |result| sink.lock().push(result))
        .expect("初始状态允许 start");

    tester
        .force_finish_with(&[CompletionEndState::new(OperationKind::Start, CompletionOutcome::Ok)])
        .expect("工作队列运行中");
    tester
        .force_finish_with(&[
            CompletionEndState::new(OperationKind::Write, CompletionOutcome::Ok),
            CompletionEndState::read(Bytes::from_static(b"doc-1")),
        ])
        .expect("工作队列运行中");
    assert!(results.lock().is_empty(), "流尚未结束");

    tester
        .force_finish_with(&[CompletionEndState::end_of_stream(Status::ok())])
        .expect("工作队列运行中");

    assert_eq!(*results.lock(), vec![Ok(vec![Bytes::from_static(b"doc-1")])]);
    assert_eq!(reader.call().written_messages(), vec![Bytes::new()]);
}
