//! 行情数据源模块
//!
//! 定义数据源抽象 `MarketFetcher`，并提供东方财富实现（与 akshare 的
//! stock_sz_a_spot_em / stock_sh_a_spot_em / stock_zh_a_hist 对应）
//!
//! 数据源只负责一次请求：整批成功或整体失败，重试由编排层处理

mod common;
mod kline;
mod spot;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::models::{AdjustMode, MarketType};

pub use common::{RawCell, SpotRow, KlineRow, RawRow};

/// 行情数据源
#[async_trait]
pub trait MarketFetcher: Send + Sync {
    /// 数据源名称，用于生成 `data_source` 标识
    fn name(&self) -> &str;

    /// 获取指定交易所全部 A 股的当日行情快照
    async fn fetch_spot(&self, market: MarketType) -> Result<Vec<RawRow>, FetchError>;

    /// 获取单只股票在日期区间内（含首尾）的日K线
    async fn fetch_history(
        &self,
        stock_code: &str,
        market: MarketType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        adjust: AdjustMode,
    ) -> Result<Vec<KlineRow>, FetchError>;
}

/// 东方财富行情接口
pub struct EastMoneyFetcher {
    client: Client,
}

impl EastMoneyFetcher {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(common::USER_AGENT)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MarketFetcher for EastMoneyFetcher {
    fn name(&self) -> &str {
        "eastmoney"
    }

    async fn fetch_spot(&self, market: MarketType) -> Result<Vec<RawRow>, FetchError> {
        spot::fetch_spot(&self.client, market).await
    }

    async fn fetch_history(
        &self,
        stock_code: &str,
        market: MarketType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        adjust: AdjustMode,
    ) -> Result<Vec<KlineRow>, FetchError> {
        kline::fetch_history(&self.client, stock_code, market, start_date, end_date, adjust).await
    }
}
