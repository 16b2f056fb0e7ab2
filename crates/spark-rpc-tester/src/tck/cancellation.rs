use bytes::Bytes;
use spark_rpc::{CallState, OperationKind};

use super::{TckCase, TckSuite};
use crate::ledger::CompletionOutcome;
use crate::support::{RecordingObserver, StreamEvent};
use crate::tester::StreamTester;

const CASES: &[TckCase] = &[
    TckCase {
        name: "call_context_cancel_is_idempotent",
        test: call_context_cancel_is_idempotent,
    },
    TckCase {
        name: "repeated_force_finish_never_double_reports",
        test: repeated_force_finish_never_double_reports,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "cancellation",
    cases: CASES,
};

pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn call_context_cancel_is_idempotent() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let _stream = tester.create_stream(RecordingObserver::new());
    let context = tester.current_context().expect("已创建流");

    assert_eq!(context.state(), CallState::Active);
    assert!(context.cancel(), "首次取消应返回 true");
    assert!(!context.cancel(), "重复取消必须保持幂等（返回 false）");
    assert_eq!(context.state(), CallState::Cancelled);
}

/// 第二次强制结束只会再次请求取消，已入账的完成不会被重复推送。
fn repeated_force_finish_never_double_reports() {
    let tester = StreamTester::new().expect("测试器应创建成功");
    let observer = RecordingObserver::new();
    let stream = tester.create_stream(observer.clone());
    stream.start().expect("初始状态允许 start");
    stream.write(Bytes::from_static(b"w")).expect("starting 状态允许写");

    tester.force_finish(&[CompletionOutcome::Ok]).expect("工作队列运行中");
    tester.force_finish(&[]).expect("工作队列运行中");

    assert_eq!(observer.events(), vec![StreamEvent::Start]);
    assert_eq!(
        tester.pending_kinds().expect("工作队列运行中"),
        vec![OperationKind::Write, OperationKind::Read],
        "每个在途操作恰好入账一次"
    );
}
