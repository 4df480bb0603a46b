//! 采集运行报告模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 复权方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMode {
    /// 不复权
    None,
    /// 前复权
    #[default]
    Qfq,
    /// 后复权
    Hfq,
}

impl AdjustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustMode::None => "none",
            AdjustMode::Qfq => "qfq",
            AdjustMode::Hfq => "hfq",
        }
    }
}

impl fmt::Display for AdjustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qfq" => Ok(AdjustMode::Qfq),
            "hfq" => Ok(AdjustMode::Hfq),
            "none" => Ok(AdjustMode::None),
            other => Err(format!("adjust_flag必须是qfq、hfq或none之一: {}", other)),
        }
    }
}

/// 采集模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    /// 全市场快照（定时任务）
    Snapshot,
    /// 按日期区间的历史采集（接口触发）
    History,
}

/// 运行结束状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// 所有工作单元均已处理
    Completed,
    /// 存储不可用，运行提前终止
    AbortedStoreUnavailable,
}

/// 单个失败工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// 工作单元标识（市场代码或股票代码）
    pub unit: String,
    /// 错误类别，如 network / upstream_format / missing_identity
    pub kind: String,
    /// 错误详情
    pub message: String,
}

/// 一次采集运行的结果
///
/// 每次运行新建，运行结束后不再修改。`succeeded + failed == total` 恒成立。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRunReport {
    pub mode: CollectionMode,
    /// 已确定结果的工作单元数
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub adjust_flag: AdjustMode,
    pub outcome: RunOutcome,
    /// 成功写入的文档数
    pub records_stored: usize,
    /// 校验失败被丢弃的行数
    pub records_invalid: usize,
    /// 被存储拒绝的文档数
    pub records_rejected: usize,
    /// 请求中显式给出的股票代码数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_codes_count: Option<usize>,
    /// 失败明细，按处理顺序，最多保留 `max_reported_failures` 条
    pub failures: Vec<UnitFailure>,
    /// 失败明细是否被截断
    pub failures_truncated: bool,
    pub started_at: String,
    pub finished_at: String,
    /// 耗时（秒）
    pub execution_time: f64,
}

/// 运行中累积结果用的构建器，运行结束时通过 `finish` 产出报告
#[derive(Debug)]
pub struct ReportBuilder {
    report: CollectionRunReport,
    max_failures: usize,
    started: std::time::Instant,
}

impl ReportBuilder {
    pub fn new(
        mode: CollectionMode,
        start_date: NaiveDate,
        end_date: NaiveDate,
        adjust_flag: AdjustMode,
        max_failures: usize,
        started_at: String,
    ) -> Self {
        Self {
            report: CollectionRunReport {
                mode,
                total: 0,
                succeeded: 0,
                failed: 0,
                start_date,
                end_date,
                adjust_flag,
                outcome: RunOutcome::Completed,
                records_stored: 0,
                records_invalid: 0,
                records_rejected: 0,
                stock_codes_count: None,
                failures: Vec::new(),
                failures_truncated: false,
                started_at: started_at.clone(),
                finished_at: started_at,
                execution_time: 0.0,
            },
            max_failures,
            started: std::time::Instant::now(),
        }
    }

    pub fn stock_codes_count(&mut self, count: usize) {
        self.report.stock_codes_count = Some(count);
    }

    pub fn unit_succeeded(&mut self) {
        self.report.total += 1;
        self.report.succeeded += 1;
    }

    pub fn unit_failed(&mut self, unit: &str, kind: &str, message: String) {
        self.report.total += 1;
        self.report.failed += 1;
        if self.report.failures.len() < self.max_failures {
            self.report.failures.push(UnitFailure {
                unit: unit.to_string(),
                kind: kind.to_string(),
                message,
            });
        } else {
            self.report.failures_truncated = true;
        }
    }

    pub fn records(&mut self, stored: usize, invalid: usize, rejected: usize) {
        self.report.records_stored += stored;
        self.report.records_invalid += invalid;
        self.report.records_rejected += rejected;
    }

    pub fn abort_store_unavailable(&mut self) {
        self.report.outcome = RunOutcome::AbortedStoreUnavailable;
    }

    pub fn finish(mut self, finished_at: String) -> CollectionRunReport {
        self.report.finished_at = finished_at;
        self.report.execution_time =
            (self.started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(max_failures: usize) -> ReportBuilder {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        ReportBuilder::new(
            CollectionMode::History,
            day,
            day,
            AdjustMode::Qfq,
            max_failures,
            "2024-01-02T15:30:00+08:00".to_string(),
        )
    }

    #[test]
    fn test_counts_stay_consistent() {
        let mut b = builder(10);
        b.unit_succeeded();
        b.unit_failed("000002", "network", "timeout".to_string());
        b.unit_succeeded();
        let report = b.finish("2024-01-02T15:31:00+08:00".to_string());

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].unit, "000002");
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_failures_are_bounded() {
        let mut b = builder(2);
        for code in ["000001", "000002", "000003"] {
            b.unit_failed(code, "upstream_format", String::new());
        }
        let report = b.finish(String::new());

        assert_eq!(report.failed, 3);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures_truncated);
    }

    #[test]
    fn test_adjust_mode_wire_format() {
        assert_eq!("hfq".parse::<AdjustMode>(), Ok(AdjustMode::Hfq));
        assert!("".parse::<AdjustMode>().is_err());
        assert_eq!(serde_json::to_string(&AdjustMode::Qfq).unwrap(), "\"qfq\"");
        assert_eq!(
            serde_json::to_string(&RunOutcome::AbortedStoreUnavailable).unwrap(),
            "\"aborted_store_unavailable\""
        );
    }
}
