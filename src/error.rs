use std::error::Error as StdError;
use std::fmt;

/// 推送分发错误类型
#[derive(Debug, Clone)]
pub enum PushError {
    /// 配置错误（构造时同步抛出，不会出现在分发过程中）
    Configuration(String),
    /// 传输错误（通道级失败，导致整个 send 拒绝）
    Transport(String),
    /// 内部错误
    Internal(String),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            PushError::Transport(msg) => write!(f, "Transport error: {}", msg),
            PushError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for PushError {}

impl From<std::io::Error> for PushError {
    fn from(err: std::io::Error) -> Self {
        PushError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        PushError::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for PushError {
    fn from(err: toml::de::Error) -> Self {
        PushError::Configuration(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PushError>;
