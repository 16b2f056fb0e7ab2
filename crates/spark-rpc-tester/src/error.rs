use spark_rpc::RpcError;
use thiserror::Error;

/// 测试桥的可恢复错误：配置问题与底层运行时错误。
///
/// 违反时序契约的用法（例如决议数量超过已到达的完成）不属于此类，而是直接 panic。
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("invalid tester configuration: {0}")]
    Config(#[source] toml::de::Error),
    #[error("failed to read tester configuration `{path}`: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("failed to spawn completion poller `{thread}`: {source}")]
    PollerSpawn {
        thread: String,
        #[source]
        source: std::io::Error,
    },
}

impl TesterError {
    pub fn code(&self) -> &'static str {
        match self {
            TesterError::Config(_) => "spark.rpc.tester.config_invalid",
            TesterError::ConfigRead { .. } => "spark.rpc.tester.config_unreadable",
            TesterError::Rpc(err) => err.code(),
            TesterError::PollerSpawn { .. } => "spark.rpc.tester.poller_spawn_failed",
        }
    }
}
