//! 日志安装入口单独成为一个测试二进制：全局订阅者每个进程只能安装一次，
//! 与依赖 `#[traced_test]` 的单元测试共处会相互抢占。

use spark_rpc_tester::{TesterConfig, init_test_logging};

#[test]
fn second_install_is_a_noop() {
    let config = TesterConfig {
        log_filter: "spark_rpc_tester=debug".to_owned(),
        ..TesterConfig::default()
    };
    assert!(init_test_logging(&config), "首次安装应成功");
    assert!(!init_test_logging(&config), "全局订阅者只能安装一次");
    tracing::debug!("logging installed");
}
