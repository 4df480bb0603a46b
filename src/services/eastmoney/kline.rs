//! 个股历史日K线
//!
//! 对应 akshare 的 stock_zh_a_hist(period="daily")

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use super::common::{check_status, secid, KlineRow, EM_KLINE_API, EM_KLINE_UT};
use crate::error::FetchError;
use crate::models::{AdjustMode, MarketType};

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

/// 复权方式对应的 fqt 参数
fn fqt(adjust: AdjustMode) -> &'static str {
    match adjust {
        AdjustMode::None => "0",
        AdjustMode::Qfq => "1",
        AdjustMode::Hfq => "2",
    }
}

pub async fn fetch_history(
    client: &Client,
    stock_code: &str,
    market: MarketType,
    start_date: NaiveDate,
    end_date: NaiveDate,
    adjust: AdjustMode,
) -> Result<Vec<KlineRow>, FetchError> {
    let secid = secid(market, stock_code);
    let beg = start_date.format("%Y%m%d").to_string();
    let end = end_date.format("%Y%m%d").to_string();

    let response = client
        .get(EM_KLINE_API)
        .query(&[
            ("fields1", "f1,f2,f3,f4,f5,f6"),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61"),
            ("ut", EM_KLINE_UT),
            ("klt", "101"),
            ("fqt", fqt(adjust)),
            ("secid", secid.as_str()),
            ("beg", beg.as_str()),
            ("end", end.as_str()),
        ])
        .send()
        .await?;

    let body: serde_json::Value = check_status(response)?.json().await?;
    parse_kline_response(body, &secid)
}

/// 解析K线响应。代码无效时接口返回 data: null，视为格式错误
fn parse_kline_response(body: serde_json::Value, secid: &str) -> Result<Vec<KlineRow>, FetchError> {
    let parsed: KlineResponse = serde_json::from_value(body)
        .map_err(|e| FetchError::UpstreamFormat(format!("K线数据解析失败: {}", e)))?;

    let data = parsed
        .data
        .ok_or_else(|| FetchError::UpstreamFormat(format!("{} 无K线数据", secid)))?;

    Ok(data.klines.iter().map(|line| KlineRow::parse(line)).collect())
}
