//! 配置模块
//!
//! 支持从 JSON 文件加载系统配置，存储连接参数等可由环境变量覆盖

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 工作线程数（0 表示使用 CPU 核心数）
    #[serde(default)]
    pub workers: usize,
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API Key（为空则不启用认证）
    #[serde(default)]
    pub api_key: String,
    /// 数据源请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 数据源连接超时时间（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 存储类型: elasticsearch, memory
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_es_host")]
    pub host: String,
    #[serde(default = "default_es_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// 是否使用 HTTPS
    #[serde(default)]
    pub use_ssl: bool,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 行情快照索引
    #[serde(default = "default_quote_index")]
    pub quote_index: String,
    /// 日K线索引
    #[serde(default = "default_daily_index")]
    pub daily_index: String,
    /// 单次 bulk 请求的文档数
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// 采集配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// 网络类错误的最大尝试次数
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    /// 首次重试等待（毫秒），之后每次翻倍
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 工作单元之间的请求间隔（毫秒）
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// 历史采集并发数
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 报告中保留的失败明细上限
    #[serde(default = "default_max_reported_failures")]
    pub max_reported_failures: usize,
}

/// 定时任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 是否启用每日定时采集
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 每日触发时间（北京时间，HH:MM）
    #[serde(default = "default_trigger_time")]
    pub trigger_time: String,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// API 配置
    #[serde(default)]
    pub api: ApiConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
    /// 存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// 采集配置
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 定时任务配置
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 加载来源文件
    #[serde(skip)]
    pub source: Option<String>,
}

// 默认值函数
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_backend() -> String { "elasticsearch".to_string() }
fn default_es_host() -> String { "localhost".to_string() }
fn default_es_port() -> u16 { 9200 }
fn default_quote_index() -> String { "stock_basic_data".to_string() }
fn default_daily_index() -> String { "stock_daily_data".to_string() }
fn default_batch_size() -> usize { 100 }
/// 重试次数上限，退避时间按 2 的幂增长
const MAX_RETRY_TIMES: u32 = 10;

fn default_retry_times() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_request_delay_ms() -> u64 { 500 }
fn default_workers() -> usize { 1 }
fn default_max_reported_failures() -> usize { 100 }
fn default_true() -> bool { true }
fn default_trigger_time() -> String { "15:30".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_es_host(),
            port: default_es_port(),
            username: String::new(),
            password: String::new(),
            use_ssl: false,
            timeout_secs: default_timeout(),
            quote_index: default_quote_index(),
            daily_index: default_daily_index(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            retry_times: default_retry_times(),
            retry_delay_ms: default_retry_delay_ms(),
            request_delay_ms: default_request_delay_ms(),
            workers: default_workers(),
            max_reported_failures: default_max_reported_failures(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_time: default_trigger_time(),
        }
    }
}

impl StoreConfig {
    /// 存储服务根地址，以 `/` 结尾便于拼接路径
    pub fn base_url(&self) -> anyhow::Result<Url> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        Ok(Url::parse(&format!("{}://{}:{}/", scheme, self.host, self.port))?)
    }
}

impl CollectorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// 解析 HH:MM 格式的触发时间
pub fn parse_trigger_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("时间格式错误，应为HH:MM: {}", s))
}

impl AppConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 加载配置：依次查找配置文件，未找到则使用默认值，随后应用环境变量覆盖并校验
    ///
    /// 在日志初始化之前调用，配置来源记录在 `source` 中
    pub fn load() -> anyhow::Result<Self> {
        let config_paths = ["config.json", "config/config.json"];
        let mut config = Self::default();

        if let Some(path) = config_paths.iter().find(|p| Path::new(p).exists()) {
            config = Self::from_file(path)
                .map_err(|e| anyhow::anyhow!("加载配置文件 {} 失败: {}", path, e))?;
            config.source = Some(path.to_string());
        }

        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// 配置来源描述
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or("默认配置")
    }

    /// 应用环境变量覆盖，`lookup` 便于测试时注入
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("ES_HOST") {
            self.store.host = v;
        }
        if let Some(v) = lookup("ES_PORT").and_then(|v| v.parse().ok()) {
            self.store.port = v;
        }
        if let Some(v) = lookup("ES_USERNAME") {
            self.store.username = v;
        }
        if let Some(v) = lookup("ES_PASSWORD") {
            self.store.password = v;
        }
        if let Some(v) = lookup("ES_USE_SSL") {
            self.store.use_ssl = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Some(v) = lookup("ES_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.store.timeout_secs = v;
        }
        if let Some(v) = lookup("STORE_BACKEND") {
            self.store.backend = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.api.api_key = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = v.to_lowercase();
        }
        if let Some(v) = lookup("SCHEDULE_TIME") {
            self.scheduler.trigger_time = v;
        }
    }

    /// 校验配置取值
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_trigger_time(&self.scheduler.trigger_time)?;
        if self.collector.workers == 0 {
            anyhow::bail!("collector.workers 必须大于 0");
        }
        if !(1..=MAX_RETRY_TIMES).contains(&self.collector.retry_times) {
            anyhow::bail!("collector.retry_times 必须在 1 到 {} 之间", MAX_RETRY_TIMES);
        }
        if self.store.batch_size == 0 {
            anyhow::bail!("store.batch_size 必须大于 0");
        }
        self.store.base_url()?;
        Ok(())
    }

    /// 获取服务器绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.store.quote_index, "stock_basic_data");
        assert_eq!(config.collector.retry_times, 3);
        assert_eq!(config.scheduler.trigger_time, "15:30");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"store": {"host": "es.internal", "use_ssl": true}}"#).unwrap();
        assert_eq!(config.store.port, 9200);
        assert_eq!(config.store.base_url().unwrap().as_str(), "https://es.internal:9200/");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "ES_HOST" => Some("10.0.0.5".to_string()),
            "ES_PORT" => Some("9201".to_string()),
            "SCHEDULE_TIME" => Some("16:05".to_string()),
            "LOG_LEVEL" => Some("DEBUG".to_string()),
            _ => None,
        });

        assert_eq!(config.store.host, "10.0.0.5");
        assert_eq!(config.store.port, 9201);
        assert_eq!(config.scheduler.trigger_time, "16:05");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.scheduler.trigger_time = "25:99".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.collector.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.collector.retry_times = 64;
        assert!(config.validate().is_err());
        config.collector.retry_times = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_trigger_time() {
        assert_eq!(
            parse_trigger_time("09:05").unwrap(),
            NaiveTime::from_hms_opt(9, 5, 0).unwrap()
        );
        assert!(parse_trigger_time("9点").is_err());
    }
}
