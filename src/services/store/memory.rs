//! 内存存储
//!
//! 与 Elasticsearch 存储语义一致的进程内实现，用于本地调试

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{SearchFilter, StoreGateway};
use crate::error::StoreError;
use crate::models::{DailyBar, MarketType, StockQuoteRecord};

#[derive(Default)]
pub struct MemoryStore {
    quotes: RwLock<BTreeMap<String, StockQuoteRecord>>,
    bars: RwLock<BTreeMap<String, DailyBar>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 日K线数量
    #[cfg(test)]
    pub async fn bar_count(&self) -> usize {
        self.bars.read().await.len()
    }

    /// 按文档 ID 读取日K线
    #[cfg(test)]
    pub async fn get_bar(&self, doc_id: &str) -> Option<DailyBar> {
        self.bars.read().await.get(doc_id).cloned()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn ensure_indices(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_one(&self, record: &StockQuoteRecord) -> Result<(), StoreError> {
        self.quotes
            .write()
            .await
            .insert(record.stock_code.clone(), record.clone());
        Ok(())
    }

    async fn upsert_many(&self, records: &[StockQuoteRecord]) -> Vec<Result<(), StoreError>> {
        let mut quotes = self.quotes.write().await;
        records
            .iter()
            .map(|record| {
                quotes.insert(record.stock_code.clone(), record.clone());
                Ok(())
            })
            .collect()
    }

    async fn upsert_bars(&self, bars: &[DailyBar]) -> Vec<Result<(), StoreError>> {
        let mut stored = self.bars.write().await;
        bars.iter()
            .map(|bar| {
                stored.insert(bar.doc_id(), bar.clone());
                Ok(())
            })
            .collect()
    }

    async fn get(&self, stock_code: &str) -> Result<StockQuoteRecord, StoreError> {
        self.quotes
            .read()
            .await
            .get(stock_code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(stock_code.to_string()))
    }

    async fn search(&self, filter: &SearchFilter, size: usize) -> Result<Vec<StockQuoteRecord>, StoreError> {
        let quotes = self.quotes.read().await;
        let mut hits: Vec<StockQuoteRecord> = quotes
            .values()
            .filter(|r| filter.stock_code.as_ref().map_or(true, |c| &r.stock_code == c))
            .filter(|r| filter.market_type.map_or(true, |m| r.market_type == m))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.update_time.cmp(&a.update_time));
        hits.truncate(size);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.quotes.read().await.len() as u64)
    }

    async fn all_codes(&self, market: Option<MarketType>) -> Result<Vec<String>, StoreError> {
        Ok(self
            .quotes
            .read()
            .await
            .values()
            .filter(|r| market.map_or(true, |m| r.market_type == m))
            .map(|r| r.stock_code.clone())
            .collect())
    }
}
