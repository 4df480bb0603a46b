//! 通用 API 响应模型
//!
//! 定义统一的 API 响应格式

use serde::{Deserialize, Serialize};
use chrono::Utc;
use chrono_tz::Asia::Shanghai;

/// 获取北京时间（UTC+8）
pub fn get_beijing_time() -> chrono::DateTime<chrono_tz::Tz> {
    Utc::now().with_timezone(&Shanghai)
}

/// 统一 API 响应结构
///
/// 所有接口返回统一格式，包含：
/// - success: 请求是否成功
/// - data: 响应数据（成功时有值）
/// - message: 响应消息
/// - error / details: 失败原因（失败时有值）
/// - timestamp: 响应时间戳（北京时间）
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 请求是否成功
    pub success: bool,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// 数据总数（列表类接口）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// 响应消息
    pub message: String,
    /// 错误类别
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 错误详情
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// 响应时间戳（ISO 8601 格式）
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    ///
    /// # 参数
    /// - data: 响应数据
    /// - message: 响应消息
    pub fn success(data: T, message: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            total: None,
            message: message.to_string(),
            error: None,
            details: None,
            timestamp: get_beijing_time().to_rfc3339(),
        }
    }

    /// 创建列表响应，附带总数
    pub fn list(data: T, total: usize, message: &str) -> Self {
        Self {
            total: Some(total),
            ..Self::success(data, message)
        }
    }

    /// 创建错误响应
    ///
    /// # 参数
    /// - error: 错误类别
    /// - details: 错误详情
    pub fn error(error: &str, details: String) -> Self {
        Self {
            success: false,
            data: None,
            total: None,
            message: error.to_string(),
            error: Some(error.to_string()),
            details: Some(details),
            timestamp: get_beijing_time().to_rfc3339(),
        }
    }

    /// 错误响应附带数据（例如运行被中止时的部分报告）
    pub fn error_with_data(error: &str, details: String, data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::error(error, details)
        }
    }
}

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// healthy / unhealthy
    pub status: String,
    pub timestamp: String,
    pub version: String,
    /// 存储是否可达
    pub store: String,
    /// 行情快照文档数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_count: Option<u64>,
}
