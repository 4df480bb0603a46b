//! 公共常量、原始数据结构和辅助函数

use reqwest::{Response, StatusCode};
use serde::Deserialize;

use crate::error::FetchError;
use crate::models::MarketType;

// ==================== 东方财富 API 常量 ====================

/// 沪深京 A 股实时行情列表 API
pub const EM_SPOT_API: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";
/// 个股历史K线 API
pub const EM_KLINE_API: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
/// 行情列表接口 ut 参数
pub const EM_SPOT_UT: &str = "bd1d9ddb04089700cf9c27f6f7426281";
/// K线接口 ut 参数
pub const EM_KLINE_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";
/// 行情列表每页数量（接口单页上限为 100）
pub const EM_SPOT_PAGE_SIZE: usize = 100;
/// 行情列表请求字段
pub const EM_SPOT_FIELDS: &str =
    "f2,f3,f4,f5,f6,f7,f9,f10,f12,f14,f15,f16,f17,f18,f20,f21,f23";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// 行情列表的市场过滤参数
pub fn spot_filter(market: MarketType) -> &'static str {
    match market {
        MarketType::SZ => "m:0 t:6,m:0 t:80",
        MarketType::SH => "m:1 t:2,m:1 t:23",
    }
}

/// K线接口的 secid，深市前缀 0，沪市前缀 1
pub fn secid(market: MarketType, stock_code: &str) -> String {
    match market {
        MarketType::SZ => format!("0.{}", stock_code),
        MarketType::SH => format!("1.{}", stock_code),
    }
}

/// 检查 HTTP 状态码并映射为数据源错误
pub fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Err(FetchError::RateLimited)
    } else if status.is_server_error() {
        Err(FetchError::Network(format!("数据源返回 {}", status)))
    } else {
        Err(FetchError::UpstreamFormat(format!("数据源返回 {}", status)))
    }
}

// ==================== 原始数据结构 ====================

/// 数据源原始单元格，停牌等情况下数值字段会返回 "-"
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawCell {
    Number(f64),
    Text(String),
}

/// 行情列表中的一行（字段编号与东方财富接口一致）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpotRow {
    /// 代码
    #[serde(rename = "f12")]
    pub code: Option<RawCell>,
    /// 名称
    #[serde(rename = "f14")]
    pub name: Option<RawCell>,
    /// 最新价
    #[serde(rename = "f2")]
    pub price: Option<RawCell>,
    /// 涨跌幅
    #[serde(rename = "f3")]
    pub change_percent: Option<RawCell>,
    /// 涨跌额
    #[serde(rename = "f4")]
    pub change_amount: Option<RawCell>,
    /// 成交量
    #[serde(rename = "f5")]
    pub volume: Option<RawCell>,
    /// 成交额
    #[serde(rename = "f6")]
    pub turnover: Option<RawCell>,
    /// 振幅
    #[serde(rename = "f7")]
    pub amplitude: Option<RawCell>,
    /// 市盈率-动态
    #[serde(rename = "f9")]
    pub pe_ratio: Option<RawCell>,
    /// 量比
    #[serde(rename = "f10")]
    pub volume_ratio: Option<RawCell>,
    /// 最高
    #[serde(rename = "f15")]
    pub high: Option<RawCell>,
    /// 最低
    #[serde(rename = "f16")]
    pub low: Option<RawCell>,
    /// 今开
    #[serde(rename = "f17")]
    pub open: Option<RawCell>,
    /// 昨收
    #[serde(rename = "f18")]
    pub prev_close: Option<RawCell>,
    /// 总市值
    #[serde(rename = "f20")]
    pub total_market_value: Option<RawCell>,
    /// 流通市值
    #[serde(rename = "f21")]
    pub circulating_market_value: Option<RawCell>,
    /// 市净率
    #[serde(rename = "f23")]
    pub pb_ratio: Option<RawCell>,
}

/// 按交易所区分的原始行情行
///
/// 交易所在数据源层就已确定，规范化时不再依赖行内字段判断
#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    Sz(SpotRow),
    Sh(SpotRow),
}

impl RawRow {
    pub fn new(market: MarketType, row: SpotRow) -> Self {
        match market {
            MarketType::SZ => RawRow::Sz(row),
            MarketType::SH => RawRow::Sh(row),
        }
    }

    pub fn market(&self) -> MarketType {
        match self {
            RawRow::Sz(_) => MarketType::SZ,
            RawRow::Sh(_) => MarketType::SH,
        }
    }

    pub fn row(&self) -> &SpotRow {
        match self {
            RawRow::Sz(row) | RawRow::Sh(row) => row,
        }
    }
}

/// 日K线原始行
///
/// 接口返回逗号分隔字符串：日期,开盘,收盘,最高,最低,成交量,成交额,振幅,涨跌幅,涨跌额,换手率
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KlineRow {
    pub date: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub volume: Option<String>,
    pub amount: Option<String>,
    pub amplitude: Option<String>,
    pub change_percent: Option<String>,
    pub change_amount: Option<String>,
    pub turnover_rate: Option<String>,
}

impl KlineRow {
    /// 解析一条K线字符串，缺失的尾部字段保留为 None
    pub fn parse(line: &str) -> Self {
        let mut fields = line.split(',').map(|s| {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        });
        let mut next = || fields.next().flatten();

        Self {
            date: next(),
            open: next(),
            close: next(),
            high: next(),
            low: next(),
            volume: next(),
            amount: next(),
            amplitude: next(),
            change_percent: next(),
            change_amount: next(),
            turnover_rate: next(),
        }
    }
}
