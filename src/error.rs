//! 错误类型定义
//!
//! 采集流水线按错误性质分类：
//! - FetchError: 数据源请求失败，网络类/限流可重试，格式错误不重试
//! - ValidationError: 单行数据校验失败，丢弃该行
//! - StoreError: 存储写入失败，Unavailable 会中止整次运行
//! - RunError: 运行级错误（并发冲突、存储不可用）

use thiserror::Error;

/// 数据源请求错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("网络请求失败: {0}")]
    Network(String),

    #[error("数据源限流")]
    RateLimited,

    #[error("数据源返回格式异常: {0}")]
    UpstreamFormat(String),
}

impl FetchError {
    /// 网络错误和限流可以重试，格式错误重试也无意义
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::RateLimited)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::RateLimited => "rate_limited",
            FetchError::UpstreamFormat(_) => "upstream_format",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            FetchError::RateLimited
        } else if err.is_decode() {
            FetchError::UpstreamFormat(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// 数据校验错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("缺少股票代码")]
    MissingIdentity,

    #[error("字段 {field} 格式错误: {value}")]
    MalformedField { field: &'static str, value: String },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingIdentity => "missing_identity",
            ValidationError::MalformedField { .. } => "malformed_field",
        }
    }
}

/// 存储错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("存储不可用: {0}")]
    Unavailable(String),

    #[error("文档被拒绝: {0}")]
    Rejected(String),

    #[error("文档不存在: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "store_unavailable",
            StoreError::Rejected(_) => "store_rejected",
            StoreError::NotFound(_) => "not_found",
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Rejected(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// 运行级错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    #[error("已有采集任务在运行")]
    AlreadyRunning,

    /// 采集任务异常退出（panic 或运行时关闭）
    #[error("采集任务异常终止: {0}")]
    Interrupted(String),
}

impl From<tokio::task::JoinError> for RunError {
    fn from(err: tokio::task::JoinError) -> Self {
        RunError::Interrupted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(FetchError::Network("reset".to_string()).is_retryable());
        assert!(FetchError::RateLimited.is_retryable());
        assert!(!FetchError::UpstreamFormat("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ValidationError::MissingIdentity.kind(), "missing_identity");
        assert_eq!(StoreError::Rejected(String::new()).kind(), "store_rejected");
        assert_eq!(FetchError::RateLimited.kind(), "rate_limited");
    }
}
