use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("no backup available for {0}")]
    NoBackupAvailable(String),

    #[error("timed out after {attempts} attempts waiting for {condition}")]
    Timeout { condition: String, attempts: u32 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed KubernetesStatus label on {source_name}: {reason}")]
    MalformedLabel { source_name: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid restore target {0}")]
    InvalidTarget(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// 是否属于“跳过该目标”而非失败的情况
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::NoBackupAvailable(_))
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
