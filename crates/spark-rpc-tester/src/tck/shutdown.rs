use spark_rpc::StatusCode;

use super::{TckCase, TckSuite};
use crate::bridge::BridgeState;
use crate::ledger::CompletionOutcome;
use crate::support::{RecordingObserver, StreamEvent};
use crate::tester::StreamTester;

const CASES: &[TckCase] = &[
    TckCase {
        name: "shutdown_twice_matches_once",
        test: shutdown_twice_matches_once,
    },
    TckCase {
        name: "shutdown_after_drain_returns",
        test: shutdown_after_drain_returns,
    },
    TckCase {
        name: "cancellation_after_shutdown_reaches_nobody",
        test: cancellation_after_shutdown_reaches_nobody,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "shutdown",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn shutdown_twice_matches_once() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    assert_eq!(tester.bridge_state(), BridgeState::Running);
    tester.shutdown();
    assert_eq!(tester.bridge_state(), BridgeState::Shutdown);
    tester.shutdown();
    assert_eq!(tester.bridge_state(), BridgeState::Shutdown);
}

/// 轮询线程已经排空全部标签时，关闭不会挂起。
fn shutdown_after_drain_returns() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let observer = RecordingObserver::new();
    let stream = tester.create_stream(observer.clone());
    stream.start().expect("初始状态允许 start");
    tester.force_finish(&[CompletionOutcome::Error]).expect("工作队列运行中");
    assert_eq!(tester.pending_completions().expect("工作队列运行中"), 0);

    tester.shutdown();

    assert_eq!(tester.bridge_state(), BridgeState::Shutdown);
    let events = observer.events();
    assert!(
        matches!(
            events.as_slice(),
            [StreamEvent::Finish(status)] if status.code() == StatusCode::Cancelled
        ),
        "{events:?}"
    );
}

/// 关闭后原始队列拒收，取消产生的标签不会进入账本。
fn cancellation_after_shutdown_reaches_nobody() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let observer = RecordingObserver::new();
    let stream = tester.create_stream(observer.clone());
    stream.start().expect("初始状态允许 start");
    tester.shutdown();

    tester.force_finish(&[]).expect("工作队列仍在运行");

    assert_eq!(tester.pending_completions().expect("工作队列仍在运行"), 0);
    assert!(observer.events().is_empty());
}
