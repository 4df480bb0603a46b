//! 沪深 A 股实时行情列表
//!
//! 对应 akshare 的 stock_sz_a_spot_em / stock_sh_a_spot_em，按页拉取直到取满 total

use reqwest::Client;
use serde::Deserialize;

use super::common::{
    check_status, spot_filter, RawRow, SpotRow, EM_SPOT_API, EM_SPOT_FIELDS,
    EM_SPOT_PAGE_SIZE, EM_SPOT_UT,
};
use crate::error::FetchError;
use crate::models::MarketType;

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: Option<SpotData>,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    total: usize,
    diff: Vec<SpotRow>,
}

/// 拉取指定交易所全部 A 股行情，任一页失败则整体失败
pub async fn fetch_spot(client: &Client, market: MarketType) -> Result<Vec<RawRow>, FetchError> {
    let mut rows = Vec::new();
    let mut page = 1usize;

    loop {
        let (total, batch) = fetch_page(client, market, page).await?;
        let batch_len = batch.len();
        rows.extend(batch.into_iter().map(|row| RawRow::new(market, row)));

        log::debug!("{} 行情第 {} 页: {} 条, 累计 {}/{}", market, page, batch_len, rows.len(), total);

        if batch_len == 0 || rows.len() >= total {
            break;
        }
        page += 1;
    }

    if rows.is_empty() {
        return Err(FetchError::UpstreamFormat(format!("{} 行情列表为空", market)));
    }

    Ok(rows)
}

async fn fetch_page(
    client: &Client,
    market: MarketType,
    page: usize,
) -> Result<(usize, Vec<SpotRow>), FetchError> {
    let pn = page.to_string();
    let pz = EM_SPOT_PAGE_SIZE.to_string();

    let response = client
        .get(EM_SPOT_API)
        .query(&[
            ("pn", pn.as_str()),
            ("pz", pz.as_str()),
            ("po", "1"),
            ("np", "1"),
            ("ut", EM_SPOT_UT),
            ("fltt", "2"),
            ("invt", "2"),
            ("fid", "f12"),
            ("fs", spot_filter(market)),
            ("fields", EM_SPOT_FIELDS),
        ])
        .send()
        .await?;

    let body: serde_json::Value = check_status(response)?.json().await?;
    parse_spot_page(body)
}

/// 解析行情列表单页响应，返回 (总数, 本页数据)
fn parse_spot_page(body: serde_json::Value) -> Result<(usize, Vec<SpotRow>), FetchError> {
    let parsed: SpotResponse = serde_json::from_value(body)
        .map_err(|e| FetchError::UpstreamFormat(format!("行情列表解析失败: {}", e)))?;

    match parsed.data {
        Some(data) => Ok((data.total, data.diff)),
        // 页码超出范围时接口返回 data: null
        None => Ok((0, Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::eastmoney::RawCell;

    #[test]
    fn test_parse_spot_page() {
        let body = serde_json::json!({
            "rc": 0,
            "data": {
                "total": 2,
                "diff": [
                    {"f12": "000001", "f14": "平安银行", "f2": 10.5, "f3": 1.2},
                    {"f12": "000002", "f14": "万科A", "f2": "-", "f3": "-"}
                ]
            }
        });

        let (total, rows) = parse_spot_page(body).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].price, Some(RawCell::Text("-".to_string())));
    }

    #[test]
    fn test_parse_spot_page_without_data() {
        let (total, rows) = parse_spot_page(serde_json::json!({"rc": 0, "data": null})).unwrap();
        assert_eq!(total, 0);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_spot_page_bad_shape() {
        let err = parse_spot_page(serde_json::json!({"data": {"total": "x"}})).unwrap_err();
        assert_eq!(err.kind(), "upstream_format");
    }
}
