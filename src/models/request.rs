//! 请求数据模型
//!
//! 接口请求体及其校验逻辑

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::AdjustMode;

/// 6 位数字股票代码
pub static STOCK_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());

/// 代码列表接口默认返回数量
pub const DEFAULT_CODES_LIMIT: usize = 1000;
/// 代码列表接口最大返回数量
pub const MAX_CODES_LIMIT: usize = 10000;

/// 历史数据采集请求体
///
/// POST /api/v1/history/collect
#[derive(Debug, Deserialize)]
pub struct HistoryCollectRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub stock_codes: Option<Vec<String>>,
    pub adjust_flag: Option<String>,
}

/// 校验后的历史采集参数
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCollectParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// 为 None 时采集存储中已知的全部代码
    pub stock_codes: Option<Vec<String>>,
    pub adjust_flag: AdjustMode,
}

impl HistoryCollectRequest {
    /// 校验请求参数，返回的错误信息直接作为 400 响应的 details
    pub fn validate(self) -> Result<HistoryCollectParams, String> {
        let start_date = parse_date("start_date", self.start_date.as_deref())?;
        let end_date = parse_date("end_date", self.end_date.as_deref())?;

        if start_date > end_date {
            return Err("start_date不能晚于end_date".to_string());
        }

        let adjust_flag = match self.adjust_flag.as_deref() {
            None => AdjustMode::default(),
            Some(flag) => flag.parse::<AdjustMode>()?,
        };

        let stock_codes = match self.stock_codes {
            Some(codes) if !codes.is_empty() => {
                let codes: Vec<String> = codes.into_iter().map(|c| c.trim().to_string()).collect();
                if let Some(bad) = codes.iter().find(|c| !STOCK_CODE_RE.is_match(c)) {
                    return Err(format!("股票代码格式错误: {}", bad));
                }
                Some(codes)
            }
            _ => None,
        };

        Ok(HistoryCollectParams {
            start_date,
            end_date,
            stock_codes,
            adjust_flag,
        })
    }
}

fn parse_date(field: &str, value: Option<&str>) -> Result<NaiveDate, String> {
    let value = value.ok_or_else(|| format!("缺少必需字段: {}", field))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{}格式错误，应为YYYY-MM-DD", field))
}

/// 校验代码列表接口的 limit 参数
pub fn validate_codes_limit(limit: Option<usize>) -> Result<usize, String> {
    match limit.unwrap_or(DEFAULT_CODES_LIMIT) {
        0 => Err("limit必须是正整数".to_string()),
        n if n > MAX_CODES_LIMIT => Err(format!("limit不能超过{}", MAX_CODES_LIMIT)),
        n => Ok(n),
    }
}

/// 调整定时任务触发时间
///
/// PUT /api/v1/scheduler/schedule
#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    /// 每日触发时间，HH:MM
    pub time: String,
}
