//! 测试日志安装入口。
//!
//! `RUST_LOG` 优先；未设置时回退到配置中的 `log_filter`，再回退到 `info`。
//! 输出走 libtest 的捕获写入器，只有失败用例才会打印。

use tracing_subscriber::EnvFilter;

use crate::config::TesterConfig;

/// 安装全局 fmt 订阅者；已有订阅者时返回 `false` 且不做任何改动。
pub fn init_test_logging(config: &TesterConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(&config.log_filter))
        .with_test_writer()
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

fn build_env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
