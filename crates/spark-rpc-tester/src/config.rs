use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::TesterError;

/// 测试桥配置。
///
/// # 契约说明（What）
/// - 所有字段都有默认值，空文档即得到 [`TesterConfig::default`]；
/// - `method` 交给模拟信道，作为每次调用的方法路径；
/// - `log_filter` 仅在未设置 `RUST_LOG` 时作为 `EnvFilter` 指令使用。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesterConfig {
    pub worker_thread_name: String,
    pub poller_thread_name: String,
    pub channel_target: String,
    pub method: String,
    pub log_filter: String,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            worker_thread_name: "spark-rpc-worker".to_owned(),
            poller_thread_name: "spark-rpc-cq-poller".to_owned(),
            channel_target: "fake:0".to_owned(),
            method: String::new(),
            log_filter: "info".to_owned(),
        }
    }
}

impl TesterConfig {
    /// 从 TOML 文本解析配置。
    pub fn from_toml_str(raw: &str) -> Result<Self, TesterError> {
        toml::from_str(raw).map_err(TesterError::Config)
    }

    /// 读取并解析 TOML 配置文件。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TesterError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| TesterError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = TesterConfig::from_toml_str("").expect("空文档应合法");
        assert_eq!(config, TesterConfig::default());
    }

    #[test]
    fn partial_document_overrides_named_fields_only() {
        let config = TesterConfig::from_toml_str(
            r#"
            worker_thread_name = "cq-worker"
            method = "/google.firestore.v1.Firestore/Listen"
            "#,
        )
        .expect("合法配置");
        assert_eq!(config.worker_thread_name, "cq-worker");
        assert_eq!(config.method, "/google.firestore.v1.Firestore/Listen");
        assert_eq!(config.poller_thread_name, TesterConfig::default().poller_thread_name);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let source = "poll_timeout_ms = 5";
        let err = TesterConfig::from_toml_str(source).expect_err("未知字段必须报错");
        assert_eq!(err.code(), "spark.rpc.tester.config_invalid");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TesterConfig::from_path("/nonexistent/spark-rpc-tester.toml")
            .expect_err("文件不存在");
        assert!(err.to_string().contains("/nonexistent/spark-rpc-tester.toml"));
    }
}
