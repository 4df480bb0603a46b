//! 采集编排
//!
//! 把一次运行拆分成工作单元（快照模式按交易所，历史模式按股票代码），
//! 逐个执行 获取 -> 规范化 -> 写入。单元之间互相隔离，一个单元失败只记入报告；
//! 存储不可用时停止领取新单元，已完成单元的结果保留在报告中。
//!
//! 同一时刻只允许一次运行，无论由定时任务还是接口触发。

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CollectorConfig;
use crate::error::{FetchError, RunError, StoreError, ValidationError};
use crate::models::{
    get_beijing_time, AdjustMode, CollectionMode, CollectionRunReport, HistoryCollectParams,
    MarketType, ReportBuilder,
};
use crate::services::eastmoney::MarketFetcher;
use crate::services::normalizer::{collection_timestamp, normalize, normalize_bars};
use crate::services::store::StoreGateway;

/// 单个工作单元的结果
#[derive(Debug)]
enum UnitOutcome {
    Succeeded,
    Failed { kind: &'static str, message: String },
    /// 存储不可用，该单元不计入报告，运行随即中止
    StoreUnavailable(String),
}

#[derive(Debug)]
struct UnitResult {
    unit: String,
    outcome: UnitOutcome,
    stored: usize,
    invalid: usize,
    rejected: usize,
    /// 第一条被存储拒绝的原因
    first_rejection: Option<StoreError>,
}

impl UnitResult {
    fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            outcome: UnitOutcome::Succeeded,
            stored: 0,
            invalid: 0,
            rejected: 0,
            first_rejection: None,
        }
    }

    fn failed(mut self, kind: &'static str, message: String) -> Self {
        self.outcome = UnitOutcome::Failed { kind, message };
        self
    }

    /// 汇总写入结果，出现 Unavailable 时整个单元标记为存储不可用
    fn absorb_writes(&mut self, outcomes: Vec<Result<(), StoreError>>) {
        for outcome in outcomes {
            match outcome {
                Ok(()) => self.stored += 1,
                Err(StoreError::Unavailable(msg)) => {
                    if !matches!(self.outcome, UnitOutcome::StoreUnavailable(_)) {
                        self.outcome = UnitOutcome::StoreUnavailable(msg);
                    }
                }
                Err(e) => {
                    log::warn!("工作单元 {} 文档写入被拒绝: {}", self.unit, e);
                    self.rejected += 1;
                    self.first_rejection.get_or_insert(e);
                }
            }
        }
    }
}

/// 运行许可，释放时清除运行标记
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 采集编排器
pub struct Orchestrator {
    fetcher: Arc<dyn MarketFetcher>,
    store: Arc<dyn StoreGateway>,
    config: CollectorConfig,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn MarketFetcher>,
        store: Arc<dyn StoreGateway>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// 是否有运行正在进行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<RunGuard<'_>, RunError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RunGuard(&self.running))
            .map_err(|_| RunError::AlreadyRunning)
    }

    /// 带退避的重试，只重试网络类错误和限流
    async fn with_retry<T, F, Fut>(&self, unit: &str, op: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.config.retry_times.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self
                        .config
                        .retry_delay()
                        .saturating_mul(2u32.saturating_pow(attempt));
                    log::warn!(
                        "{} 获取失败 (第{}/{}次): {}，{}ms 后重试",
                        unit,
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 在独立任务中执行历史采集
    ///
    /// 运行不随调用方一起取消：调用方中途放弃等待（如 HTTP 客户端断开）时，
    /// 采集仍会执行完毕或因存储不可用中止
    pub async fn spawn_history(
        self: &Arc<Self>,
        params: HistoryCollectParams,
    ) -> Result<CollectionRunReport, RunError> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run_history(params).await }).await?
    }

    /// 全市场行情快照采集，每个交易所一个工作单元
    pub async fn run_snapshot(&self) -> Result<CollectionRunReport, RunError> {
        let _guard = self.acquire()?;
        let today = get_beijing_time().date_naive();
        let mut report = ReportBuilder::new(
            CollectionMode::Snapshot,
            today,
            today,
            AdjustMode::None,
            self.config.max_reported_failures,
            collection_timestamp(),
        );
        log::info!("开始行情快照采集");

        for (i, market) in MarketType::ALL.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            let result = self.collect_market(*market).await;
            if !self.record(&mut report, result) {
                break;
            }
        }

        let report = report.finish(collection_timestamp());
        log::info!(
            "行情快照采集结束: 成功 {}/{}，写入 {} 条，耗时 {}s",
            report.succeeded,
            report.total,
            report.records_stored,
            report.execution_time
        );
        Ok(report)
    }

    /// 按日期区间采集日K线，每只股票一个工作单元
    ///
    /// 未指定股票代码时使用存储中已有的全部代码
    pub async fn run_history(
        &self,
        params: HistoryCollectParams,
    ) -> Result<CollectionRunReport, RunError> {
        let _guard = self.acquire()?;
        let mut report = ReportBuilder::new(
            CollectionMode::History,
            params.start_date,
            params.end_date,
            params.adjust_flag,
            self.config.max_reported_failures,
            collection_timestamp(),
        );

        let codes = match params.stock_codes.clone() {
            Some(codes) => {
                report.stock_codes_count(codes.len());
                codes
            }
            None => match self.store.all_codes(None).await {
                Ok(codes) => codes,
                Err(e) => {
                    log::error!("获取股票代码列表失败: {}", e);
                    if matches!(e, StoreError::Unavailable(_)) {
                        report.abort_store_unavailable();
                    }
                    return Ok(report.finish(collection_timestamp()));
                }
            },
        };

        log::info!(
            "开始历史数据采集: {} 只股票，{} ~ {}，复权方式 {}",
            codes.len(),
            params.start_date,
            params.end_date,
            params.adjust_flag
        );

        let workers = self.config.workers.max(1);
        let params = &params;
        let mut results = stream::iter(codes.into_iter().enumerate())
            .map(|(i, code)| async move {
                if i >= workers {
                    self.pause().await;
                }
                self.collect_code(&code, params).await
            })
            .buffered(workers);

        while let Some(result) = results.next().await {
            if !self.record(&mut report, result) {
                break;
            }
        }
        drop(results);

        let report = report.finish(collection_timestamp());
        log::info!(
            "历史数据采集结束: 成功 {}/{}，失败 {}，写入 {} 条，耗时 {}s",
            report.succeeded,
            report.total,
            report.failed,
            report.records_stored,
            report.execution_time
        );
        Ok(report)
    }

    async fn pause(&self) {
        let delay = self.config.request_delay();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }

    /// 把单元结果记入报告，返回是否继续运行
    ///
    /// 遇到存储不可用的单元不计入 total，它的记录计数也一并丢弃
    fn record(&self, report: &mut ReportBuilder, result: UnitResult) -> bool {
        match result.outcome {
            UnitOutcome::Succeeded => {
                report.records(result.stored, result.invalid, result.rejected);
                report.unit_succeeded();
                true
            }
            UnitOutcome::Failed { kind, message } => {
                log::warn!("工作单元 {} 失败 [{}]: {}", result.unit, kind, message);
                report.records(result.stored, result.invalid, result.rejected);
                report.unit_failed(&result.unit, kind, message);
                true
            }
            UnitOutcome::StoreUnavailable(msg) => {
                log::error!(
                    "存储不可用，中止本次运行: {}（单元 {} 已写入 {} 条不计入报告）",
                    msg,
                    result.unit,
                    result.stored
                );
                report.abort_store_unavailable();
                false
            }
        }
    }

    async fn collect_market(&self, market: MarketType) -> UnitResult {
        let mut result = UnitResult::new(market.as_str());
        let source_tag = format!(
            "{}_{}_a_spot",
            self.fetcher.name(),
            market.as_str().to_lowercase()
        );

        let rows = match self
            .with_retry(market.as_str(), move || self.fetcher.fetch_spot(market))
            .await
        {
            Ok(rows) => rows,
            Err(e) => return result.failed(e.kind(), e.to_string()),
        };

        let update_time = collection_timestamp();
        let mut records = Vec::with_capacity(rows.len());
        for raw in &rows {
            match normalize(raw, &source_tag, &update_time) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::debug!("{} 行情数据无效: {}", market, e);
                    result.invalid += 1;
                }
            }
        }
        log::info!(
            "{} 获取 {} 条，有效 {} 条",
            market,
            rows.len(),
            records.len()
        );

        let outcomes = self.store.upsert_many(&records).await;
        result.absorb_writes(outcomes);
        result
    }

    async fn collect_code(&self, code: &str, params: &HistoryCollectParams) -> UnitResult {
        let mut result = UnitResult::new(code);
        let Some(market) = MarketType::infer_from_code(code) else {
            let e = ValidationError::MalformedField {
                field: "stock_code",
                value: format!("{}（无法识别所属交易所）", code),
            };
            return result.failed(e.kind(), e.to_string());
        };

        let rows = match self
            .with_retry(code, move || {
                self.fetcher.fetch_history(
                    code,
                    market,
                    params.start_date,
                    params.end_date,
                    params.adjust_flag,
                )
            })
            .await
        {
            Ok(rows) => rows,
            Err(e) => return result.failed(e.kind(), e.to_string()),
        };

        let source_tag = format!("{}_kline", self.fetcher.name());
        let (bars, invalid) = normalize_bars(
            &rows,
            code,
            market,
            params.adjust_flag,
            &source_tag,
            &collection_timestamp(),
        );
        result.invalid = invalid;

        if !rows.is_empty() && bars.is_empty() {
            let e = ValidationError::MalformedField {
                field: "kline",
                value: format!("{} 条K线全部无效", rows.len()),
            };
            return result.failed(e.kind(), e.to_string());
        }

        let outcomes = self.store.upsert_bars(&bars).await;
        result.absorb_writes(outcomes);
        if matches!(result.outcome, UnitOutcome::Succeeded) {
            if let Some(e) = result.first_rejection.take() {
                let message = format!("{} 条K线被存储拒绝: {}", result.rejected, e);
                return result.failed(e.kind(), message);
            }
        }
        result
    }
}
