//! 以标准 `#[test]` 形式运行全部测试器契约套件。

use spark_rpc_tester::tck;

#[test]
fn ordering_suite() {
    tck::run_ordering_suite();
}

#[test]
fn cancellation_suite() {
    tck::run_cancellation_suite();
}

#[test]
fn shutdown_suite() {
    tck::run_shutdown_suite();
}

#[test]
fn reader_suite() {
    tck::run_reader_suite();
}

#[test]
fn registry_lists_every_suite_once() {
    let names: Vec<_> = tck::all_suites().iter().map(|suite| suite.name).collect();
    assert_eq!(names, ["ordering", "cancellation", "shutdown", "reader"]);
}

#[test]
#[should_panic(expected = "[spark-rpc-tester::synthetic::always_fails]")]
fn failing_case_is_reported_with_context() {
    fn always_fails() {
        panic!("boom");
    }
    const CASES: &[tck::TckCase] = &[tck::TckCase {
        name: "always_fails",
        test: always_fails,
    }];
    tck::run_suite(&tck::TckSuite {
        name: "synthetic",
        cases: CASES,
    });
}
