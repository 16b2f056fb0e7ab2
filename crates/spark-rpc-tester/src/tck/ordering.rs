use bytes::Bytes;
use spark_rpc::{OperationKind, Status, StatusCode};

use super::{TckCase, TckSuite};
use crate::ledger::{CompletionEndState, CompletionOutcome};
use crate::support::{RecordingObserver, StreamEvent};
use crate::tester::StreamTester;

const CASES: &[TckCase] = &[
    TckCase {
        name: "outcomes_are_delivered_in_fifo_order",
        test: outcomes_are_delivered_in_fifo_order,
    },
    TckCase {
        name: "end_states_inject_message_and_status",
        test: end_states_inject_message_and_status,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "ordering",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// start、两次写依序完成；start 成功后发起的读只进入账本，不会被决议。
fn outcomes_are_delivered_in_fifo_order() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let observer = RecordingObserver::new();
    let stream = tester.create_stream(observer.clone());
    stream.start().expect("初始状态允许 start");
    stream.write(Bytes::from_static(b"a")).expect("starting 状态允许写");
    stream.write(Bytes::from_static(b"b")).expect("starting 状态允许写");

    tester
        .force_finish(&[CompletionOutcome::Ok, CompletionOutcome::Ok, CompletionOutcome::Error])
        .expect("工作队列运行中");

    let events = observer.events();
    assert_eq!(events.len(), 3, "恰好三个回调：{events:?}");
    assert_eq!(events[0], StreamEvent::Start);
    assert_eq!(events[1], StreamEvent::Write);
    assert!(
        matches!(&events[2], StreamEvent::Finish(status) if status.code() == StatusCode::Cancelled),
        "第三个操作失败应以取消终态结束：{events:?}"
    );
    assert_eq!(
        tester.pending_kinds().expect("工作队列运行中"),
        vec![OperationKind::Read],
        "start 成功后发起的读应停留在账本中"
    );
}

/// 注入的读消息与终态原样交付给观察者。
fn end_states_inject_message_and_status() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let observer = RecordingObserver::new();
    let stream = tester.create_stream(observer.clone());
    stream.start().expect("初始状态允许 start");

    tester
        .force_finish_with(&[CompletionEndState::new(OperationKind::Start, CompletionOutcome::Ok)])
        .expect("工作队列运行中");
    tester
        .force_finish_with(&[CompletionEndState::read(Bytes::from_static(b"doc-1"))])
        .expect("工作队列运行中");
    tester
        .force_finish_with(&[CompletionEndState::end_of_stream(Status::ok())])
        .expect("工作队列运行中");

    assert_eq!(
        observer.events(),
        vec![
            StreamEvent::Start,
            StreamEvent::Read(Bytes::from_static(b"doc-1")),
            StreamEvent::Finish(Status::ok()),
        ]
    );
}
