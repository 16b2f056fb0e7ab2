//! 桥与强制结束控制器的性质测试。
//!
//! - 性质 1：任意 N 个经原始队列到达的标签与 N 个结果，恰好触发 N 次回调，顺序与到达顺序一致，
//!   成功标记与请求的结果一致，原始队列上的 `ok` 位不影响结果；决议后账本为空。
//! - 性质 2：流发起 start 与 k 次写后强制结束，观察者看到的事件恰好是“首个 Error 之前的前缀 + 一次终态”。

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;
use spark_rpc::{AsyncQueue, Completion, OperationKind, StatusCode};
use spark_rpc_tester::{
    CompletionBridge, CompletionOutcome, RecordingObserver, StreamEvent, StreamTester, shared_vec,
};

fn outcome() -> impl Strategy<Value = CompletionOutcome> {
    prop_oneof![Just(CompletionOutcome::Ok), Just(CompletionOutcome::Error)]
}

fn operation_kind() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Start),
        Just(OperationKind::Read),
        Just(OperationKind::Write),
        Just(OperationKind::Finish),
    ]
}

#[derive(Debug, PartialEq, Eq)]
enum Observed {
    Start,
    Write,
    Finish(StatusCode),
}

fn observed(events: Vec<StreamEvent>) -> Vec<Observed> {
    events
        .into_iter()
        .map(|event| match event {
            StreamEvent::Start => Observed::Start,
            StreamEvent::Write => Observed::Write,
            StreamEvent::Finish(status) => Observed::Finish(status.code()),
            StreamEvent::Read(message) => panic!("未决议的读不应交付消息：{message:?}"),
        })
        .collect()
}

/// 影子模型：首个 Error 之前逐个交付，Error 以取消终态结束流。
fn expected_events(outcomes: &[CompletionOutcome]) -> Vec<Observed> {
    let mut events = Vec::new();
    for (index, outcome) in outcomes.iter().enumerate() {
        if !outcome.succeeded() {
            events.push(Observed::Finish(StatusCode::Cancelled));
            break;
        }
        events.push(if index == 0 { Observed::Start } else { Observed::Write });
    }
    events
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_bridge_resolves_each_tag_once_in_arrival_order(
        tags in prop::collection::vec((operation_kind(), any::<bool>(), outcome()), 0..12)
    ) {
        let worker = AsyncQueue::new("prop-bridge-worker").expect("工作线程应创建成功");
        let worker = Arc::new(worker);
        let bridge = CompletionBridge::start(Arc::clone(&worker), "prop-bridge-poller")
            .expect("轮询线程应创建成功");

        let log = shared_vec();
        let mut expected = Vec::with_capacity(tags.len());
        for (kind, raw_ok, outcome) in &tags {
            let sink = Arc::clone(&log);
            let tag = Completion::new(*kind, move |event| {
                sink.lock().push((event.id, event.kind, event.ok));
            });
            expected.push((tag.id(), *kind, outcome.succeeded()));
            bridge.raw_queue().push(tag, *raw_ok).expect("原始队列运行中");
        }

        bridge.settle(bridge.raw_queue().pushed_total());
        prop_assert_eq!(bridge.pending_len().expect("工作队列运行中"), tags.len());

        let outcomes: Vec<_> = tags.iter().map(|(_, _, outcome)| *outcome).collect();
        bridge.run_completions(&outcomes).expect("工作队列运行中");

        prop_assert_eq!(log.lock().clone(), expected);
        prop_assert_eq!(bridge.pending_len().expect("工作队列运行中"), 0);
        bridge.shutdown();
    }

    #[test]
    fn prop_stream_observes_prefix_until_first_error(
        outcomes in prop::collection::vec(outcome(), 1..8)
    ) {
        let tester = StreamTester::new().expect("测试器应创建成功");
        let observer = RecordingObserver::new();
        let stream = tester.create_stream(observer.clone());
        stream.start().expect("初始状态允许 start");
        for index in 1..outcomes.len() {
            stream
                .write(Bytes::from(format!("message-{index}")))
                .expect("starting 状态允许写");
        }

        tester.force_finish(&outcomes).expect("工作队列运行中");

        prop_assert_eq!(observed(observer.events()), expected_events(&outcomes));
        prop_assert!(observer.finish_count() <= 1);
    }
}
