//! 数据规范化
//!
//! 把数据源原始行转换为入库文档。只有身份字段（股票代码、K线日期）严格校验，
//! 数值字段无法解析时记为 None，不影响整行。

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::models::{get_beijing_time, AdjustMode, DailyBar, MarketType, StockQuoteRecord, STOCK_CODE_RE};
use crate::services::eastmoney::{KlineRow, RawCell, RawRow};

/// 采集时间戳（北京时间）
pub fn collection_timestamp() -> String {
    get_beijing_time().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 宽松解析数值，"-"、空串、NaN 等都视为缺失
fn number(cell: &Option<RawCell>) -> Option<f64> {
    match cell {
        Some(RawCell::Number(n)) if n.is_finite() => Some(*n),
        Some(RawCell::Text(s)) => parse_number(s),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn text(cell: &Option<RawCell>) -> Option<String> {
    match cell {
        Some(RawCell::Text(s)) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        // 个别接口会把代码以数字形式返回，前导零需要补齐
        Some(RawCell::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => Some(format!("{:06}", *n as u64)),
        Some(RawCell::Number(n)) => Some(n.to_string()),
        None => None,
    }
}

/// 校验股票代码
pub fn validate_code(code: Option<String>) -> Result<String, ValidationError> {
    let code = code.ok_or(ValidationError::MissingIdentity)?;
    if STOCK_CODE_RE.is_match(&code) {
        Ok(code)
    } else {
        Err(ValidationError::MalformedField {
            field: "stock_code",
            value: code,
        })
    }
}

/// 规范化一行行情快照
///
/// 交易所由原始行的变体决定，`update_time` 与 `data_source` 由调用方统一传入，
/// 保证同一批次的文档采集时间一致
pub fn normalize(
    raw: &RawRow,
    source_tag: &str,
    update_time: &str,
) -> Result<StockQuoteRecord, ValidationError> {
    let row = raw.row();
    let stock_code = validate_code(text(&row.code))?;

    Ok(StockQuoteRecord {
        stock_code,
        stock_name: text(&row.name).unwrap_or_default(),
        market_type: raw.market(),
        current_price: number(&row.price),
        change_percent: number(&row.change_percent),
        change_amount: number(&row.change_amount),
        volume: number(&row.volume),
        turnover: number(&row.turnover),
        amplitude: number(&row.amplitude),
        highest_price: number(&row.high),
        lowest_price: number(&row.low),
        opening_price: number(&row.open),
        previous_close: number(&row.prev_close),
        volume_ratio: number(&row.volume_ratio),
        pe_ratio: number(&row.pe_ratio),
        pb_ratio: number(&row.pb_ratio),
        total_market_value: number(&row.total_market_value),
        circulating_market_value: number(&row.circulating_market_value),
        update_time: update_time.to_string(),
        data_source: source_tag.to_string(),
    })
}

/// 规范化单根日K线，日期是 K 线的身份字段
pub fn normalize_bar(
    row: &KlineRow,
    stock_code: &str,
    market: MarketType,
    adjust: AdjustMode,
    prev_close: Option<f64>,
    source_tag: &str,
    update_time: &str,
) -> Result<DailyBar, ValidationError> {
    let date = row.date.as_deref().ok_or(ValidationError::MissingIdentity)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        ValidationError::MalformedField {
            field: "date",
            value: date.to_string(),
        }
    })?;
    let num = |v: &Option<String>| v.as_deref().and_then(parse_number);

    Ok(DailyBar {
        stock_code: stock_code.to_string(),
        market_type: market,
        date: date.format("%Y-%m-%d").to_string(),
        open_price: num(&row.open),
        close_price: num(&row.close),
        high_price: num(&row.high),
        low_price: num(&row.low),
        prev_close_price: prev_close,
        volume: num(&row.volume),
        amount: num(&row.amount),
        amplitude: num(&row.amplitude),
        change_percent: num(&row.change_percent),
        change_amount: num(&row.change_amount),
        turnover_rate: num(&row.turnover_rate),
        adjust_flag: adjust.to_string(),
        update_time: update_time.to_string(),
        data_source: source_tag.to_string(),
    })
}

/// 批量规范化K线
///
/// 按日期升序处理，前收盘价取上一根有效K线的收盘价。返回有效K线和被丢弃的行数。
pub fn normalize_bars(
    rows: &[KlineRow],
    stock_code: &str,
    market: MarketType,
    adjust: AdjustMode,
    source_tag: &str,
    update_time: &str,
) -> (Vec<DailyBar>, usize) {
    let mut sorted: Vec<&KlineRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date));

    let mut bars = Vec::with_capacity(sorted.len());
    let mut invalid = 0;
    let mut prev_close = None;

    for row in sorted {
        match normalize_bar(row, stock_code, market, adjust, prev_close, source_tag, update_time) {
            Ok(bar) => {
                prev_close = bar.close_price;
                bars.push(bar);
            }
            Err(e) => {
                log::warn!("股票 {} K线数据无效: {}", stock_code, e);
                invalid += 1;
            }
        }
    }

    (bars, invalid)
}
