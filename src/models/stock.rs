//! 股票数据模型
//!
//! 定义入库的行情快照和日K线文档结构

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 交易所标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    /// 深圳证券交易所
    SZ,
    /// 上海证券交易所
    SH,
}

impl MarketType {
    /// 快照模式需要采集的全部市场，顺序即处理顺序
    pub const ALL: [MarketType; 2] = [MarketType::SZ, MarketType::SH];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::SZ => "SZ",
            MarketType::SH => "SH",
        }
    }

    /// 根据 6 位代码前缀推断所属交易所
    ///
    /// 6/9/5 开头为上交所，0/1/2/3 开头为深交所，其他返回 None
    pub fn infer_from_code(code: &str) -> Option<Self> {
        match code.chars().next()? {
            '6' | '9' | '5' => Some(MarketType::SH),
            '0' | '1' | '2' | '3' => Some(MarketType::SZ),
            _ => None,
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SZ" => Ok(MarketType::SZ),
            "SH" => Ok(MarketType::SH),
            other => Err(format!("未知市场类型: {}", other)),
        }
    }
}

/// 股票行情快照
///
/// 每只股票在行情索引中只保留一份最新快照，以 `stock_code` 作为文档 ID 覆盖写入。
/// 数值字段为 None 表示数据源本次未提供，不等同于 0。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuoteRecord {
    /// 股票代码
    pub stock_code: String,
    /// 股票名称
    pub stock_name: String,
    /// 交易所
    pub market_type: MarketType,
    /// 最新价
    pub current_price: Option<f64>,
    /// 涨跌幅（百分比）
    pub change_percent: Option<f64>,
    /// 涨跌额
    pub change_amount: Option<f64>,
    /// 成交量（手）
    pub volume: Option<f64>,
    /// 成交额（元）
    pub turnover: Option<f64>,
    /// 振幅
    pub amplitude: Option<f64>,
    /// 最高
    pub highest_price: Option<f64>,
    /// 最低
    pub lowest_price: Option<f64>,
    /// 今开
    pub opening_price: Option<f64>,
    /// 昨收
    pub previous_close: Option<f64>,
    /// 量比
    pub volume_ratio: Option<f64>,
    /// 市盈率-动态
    pub pe_ratio: Option<f64>,
    /// 市净率
    pub pb_ratio: Option<f64>,
    /// 总市值
    pub total_market_value: Option<f64>,
    /// 流通市值
    pub circulating_market_value: Option<f64>,
    /// 采集时间（北京时间，`YYYY-MM-DD HH:MM:SS`）
    pub update_time: String,
    /// 数据来源标识
    pub data_source: String,
}

/// 日K线数据
///
/// 历史采集写入日线索引，文档 ID 为 `{stock_code}_{date}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub stock_code: String,
    pub market_type: MarketType,
    /// 交易日（YYYY-MM-DD）
    pub date: String,
    pub open_price: Option<f64>,
    pub close_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    /// 前一根K线的收盘价，窗口内第一根为空
    pub prev_close_price: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
    pub amplitude: Option<f64>,
    pub change_percent: Option<f64>,
    pub change_amount: Option<f64>,
    pub turnover_rate: Option<f64>,
    /// 复权方式
    pub adjust_flag: String,
    pub update_time: String,
    pub data_source: String,
}

impl DailyBar {
    /// 日线索引中的文档 ID
    pub fn doc_id(&self) -> String {
        format!("{}_{}", self.stock_code, self.date)
    }
}

/// 股票代码列表查询参数
#[derive(Debug, Deserialize)]
pub struct StockCodesQuery {
    /// 返回数量限制，默认 1000，最大 10000
    pub limit: Option<usize>,
    /// 按市场过滤
    pub market_type: Option<MarketType>,
}

/// 行情检索查询参数
#[derive(Debug, Deserialize)]
pub struct StockSearchQuery {
    pub stock_code: Option<String>,
    pub market_type: Option<MarketType>,
    /// 返回条数，默认 20，最大 1000
    pub size: Option<usize>,
}

impl StockSearchQuery {
    pub const DEFAULT_SIZE: usize = 20;
    pub const MAX_SIZE: usize = 1000;

    pub fn size(&self) -> usize {
        self.size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_market_from_code() {
        assert_eq!(MarketType::infer_from_code("600000"), Some(MarketType::SH));
        assert_eq!(MarketType::infer_from_code("900901"), Some(MarketType::SH));
        assert_eq!(MarketType::infer_from_code("000001"), Some(MarketType::SZ));
        assert_eq!(MarketType::infer_from_code("300750"), Some(MarketType::SZ));
        assert_eq!(MarketType::infer_from_code("830799"), None);
        assert_eq!(MarketType::infer_from_code(""), None);
    }

    #[test]
    fn test_market_type_parse() {
        assert_eq!("sz".parse::<MarketType>(), Ok(MarketType::SZ));
        assert_eq!("SH".parse::<MarketType>(), Ok(MarketType::SH));
        assert!("BJ".parse::<MarketType>().is_err());
        assert_eq!(serde_json::to_string(&MarketType::SH).unwrap(), "\"SH\"");
    }
}
