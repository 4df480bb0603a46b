//! 文档存储网关
//!
//! 行情快照按 `stock_code` 覆盖写入（最后一次写入生效），日K线按
//! `{stock_code}_{date}` 覆盖写入。网关内部不做重试，只负责把存储层的错误
//! 归类为 `StoreError::Unavailable`（整次运行中止）或 `StoreError::Rejected`（单条失败）。

mod elasticsearch;
mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{DailyBar, MarketType, StockQuoteRecord};

pub use elasticsearch::ElasticsearchStore;
pub use memory::MemoryStore;

/// 行情检索条件，字段为空表示不过滤
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub stock_code: Option<String>,
    pub market_type: Option<MarketType>,
}

/// 存储网关
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// 存储是否可达
    async fn ping(&self) -> bool;

    /// 确保行情索引和日线索引存在
    async fn ensure_indices(&self) -> Result<(), StoreError>;

    /// 写入单条行情快照，已存在则整体覆盖
    async fn upsert_one(&self, record: &StockQuoteRecord) -> Result<(), StoreError>;

    /// 批量写入行情快照，返回与输入一一对应的结果
    async fn upsert_many(&self, records: &[StockQuoteRecord]) -> Vec<Result<(), StoreError>>;

    /// 批量写入日K线，返回与输入一一对应的结果
    async fn upsert_bars(&self, bars: &[DailyBar]) -> Vec<Result<(), StoreError>>;

    /// 按代码读取行情快照
    async fn get(&self, stock_code: &str) -> Result<StockQuoteRecord, StoreError>;

    /// 按条件检索，按更新时间倒序
    async fn search(&self, filter: &SearchFilter, size: usize) -> Result<Vec<StockQuoteRecord>, StoreError>;

    /// 行情快照总数
    async fn count(&self) -> Result<u64, StoreError>;

    /// 已知的全部股票代码，按代码升序且去重
    async fn all_codes(&self, market: Option<MarketType>) -> Result<Vec<String>, StoreError>;
}

/// 根据配置创建存储网关
pub fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn StoreGateway>> {
    match config.backend.as_str() {
        "elasticsearch" => Ok(Arc::new(ElasticsearchStore::new(config)?)),
        "memory" => {
            log::warn!("使用内存存储，进程退出后数据丢失");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(anyhow::anyhow!("不支持的存储类型: {}", other)),
    }
}
