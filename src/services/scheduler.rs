//! 每日定时采集
//!
//! 每天在北京时间的触发时刻执行一次行情快照采集，由 tokio-cron-scheduler 驱动。
//! 触发时间可在运行期修改，定时触发也可随时停用和恢复；到点时若已有运行在进行则跳过本次触发。

use anyhow::anyhow;
use chrono::{NaiveTime, Timelike};
use chrono_tz::Asia::Shanghai;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{parse_trigger_time, SchedulerConfig};
use crate::error::RunError;
use crate::models::CollectionRunReport;
use crate::services::orchestrator::Orchestrator;

/// 定时任务状态
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// 定时触发是否启用
    pub enabled: bool,
    /// 触发时间（HH:MM）
    pub trigger_time: String,
    /// 下次触发时间（北京时间），停用时为空
    pub next_fire: Option<String>,
    pub is_running: bool,
    /// 最近一次定时或手动快照运行的报告
    pub last_report: Option<CollectionRunReport>,
}

struct SchedulerState {
    enabled: bool,
    trigger_time: NaiveTime,
    job_id: Option<Uuid>,
    last_report: Option<CollectionRunReport>,
}

/// 每日触发时间对应的 cron 表达式（秒 分 时 日 月 周）
pub fn cron_expression(trigger: NaiveTime) -> String {
    format!("0 {} {} * * *", trigger.minute(), trigger.hour())
}

/// 定时任务
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    cron: JobScheduler,
    state: RwLock<SchedulerState>,
}

impl Scheduler {
    /// 创建定时任务，配置启用时同时注册每日任务
    ///
    /// 注册后需调用 `launch` 才会开始计时
    pub async fn new(
        orchestrator: Arc<Orchestrator>,
        config: &SchedulerConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let trigger_time = parse_trigger_time(&config.trigger_time)?;
        let cron = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("创建调度器失败: {}", e))?;

        let scheduler = Arc::new(Self {
            orchestrator,
            cron,
            state: RwLock::new(SchedulerState {
                enabled: false,
                trigger_time,
                job_id: None,
                last_report: None,
            }),
        });

        if config.enabled {
            scheduler.start().await?;
        } else {
            log::info!("定时采集未启用");
        }
        Ok(scheduler)
    }

    /// 启动调度器计时
    pub async fn launch(&self) -> anyhow::Result<()> {
        self.cron
            .start()
            .await
            .map_err(|e| anyhow!("启动调度器失败: {}", e))
    }

    /// 关闭调度器，正在进行的采集不受影响
    pub async fn shutdown(&self) {
        let mut cron = self.cron.clone();
        match cron.shutdown().await {
            Ok(()) => log::info!("调度器已关闭"),
            Err(e) => log::warn!("关闭调度器失败: {}", e),
        }
    }

    fn build_job(self: &Arc<Self>, trigger_time: NaiveTime) -> anyhow::Result<Job> {
        let scheduler: Weak<Self> = Arc::downgrade(self);
        Job::new_async_tz(
            cron_expression(trigger_time).as_str(),
            Shanghai,
            move |_uuid, _lock| {
                let scheduler = scheduler.clone();
                Box::pin(async move {
                    if let Some(scheduler) = scheduler.upgrade() {
                        scheduler.fire().await;
                    }
                })
            },
        )
        .map_err(|e| anyhow!("创建定时任务失败: {}", e))
    }

    /// 移除旧任务，按新的启用状态和触发时间重新注册
    async fn install(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        enabled: bool,
        trigger_time: NaiveTime,
    ) -> anyhow::Result<()> {
        if let Some(job_id) = state.job_id {
            self.cron
                .remove(&job_id)
                .await
                .map_err(|e| anyhow!("移除定时任务失败: {}", e))?;
            state.job_id = None;
        }

        if enabled {
            let job = self.build_job(trigger_time)?;
            let job_id = self
                .cron
                .add(job)
                .await
                .map_err(|e| anyhow!("注册定时任务失败: {}", e))?;
            state.job_id = Some(job_id);
        }

        state.enabled = enabled;
        state.trigger_time = trigger_time;
        Ok(())
    }

    /// 修改每日触发时间，立即生效
    pub async fn reschedule(self: &Arc<Self>, time: &str) -> anyhow::Result<SchedulerStatus> {
        let trigger_time = parse_trigger_time(time)?;
        {
            let mut state = self.state.write().await;
            let enabled = state.enabled;
            self.install(&mut state, enabled, trigger_time).await?;
        }
        log::info!("定时任务触发时间修改为 {}", trigger_time.format("%H:%M"));
        Ok(self.status().await)
    }

    /// 启用每日定时触发
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<SchedulerStatus> {
        {
            let mut state = self.state.write().await;
            if !state.enabled {
                let trigger_time = state.trigger_time;
                self.install(&mut state, true, trigger_time).await?;
                log::info!(
                    "定时采集已启用，每日 {} 执行",
                    trigger_time.format("%H:%M")
                );
            }
        }
        Ok(self.status().await)
    }

    /// 停用每日定时触发，不影响正在进行的采集
    pub async fn stop(self: &Arc<Self>) -> anyhow::Result<SchedulerStatus> {
        {
            let mut state = self.state.write().await;
            if state.enabled {
                let trigger_time = state.trigger_time;
                self.install(&mut state, false, trigger_time).await?;
                log::info!("定时采集已停用");
            }
        }
        Ok(self.status().await)
    }

    /// 立即执行一次快照采集并返回报告
    ///
    /// 采集在独立任务中进行，调用方放弃等待时运行照常完成并记录报告
    pub async fn run_now(self: &Arc<Self>) -> Result<CollectionRunReport, RunError> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.collect_snapshot().await }).await?
    }

    async fn collect_snapshot(&self) -> Result<CollectionRunReport, RunError> {
        let report = self.orchestrator.run_snapshot().await?;
        self.state.write().await.last_report = Some(report.clone());
        Ok(report)
    }

    /// 定时触发入口，停用或已有运行时跳过，返回本次运行的报告
    pub async fn fire(self: &Arc<Self>) -> Option<CollectionRunReport> {
        if !self.state.read().await.enabled {
            log::info!("定时采集已停用，跳过本次触发");
            return None;
        }
        if self.orchestrator.is_running() {
            log::warn!("已有采集任务在运行，跳过本次定时触发");
            return None;
        }

        log::info!("定时采集开始");
        match self.run_now().await {
            Ok(report) => {
                log::info!(
                    "定时采集完成: 成功 {}/{}，写入 {} 条",
                    report.succeeded,
                    report.total,
                    report.records_stored
                );
                Some(report)
            }
            Err(RunError::AlreadyRunning) => {
                log::warn!("已有采集任务在运行，跳过本次定时触发");
                None
            }
            Err(e) => {
                log::error!("定时采集失败: {}", e);
                None
            }
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.read().await;
        let next_fire = match state.job_id {
            Some(job_id) => self
                .cron
                .clone()
                .next_tick_for_job(job_id)
                .await
                .ok()
                .flatten()
                .map(|t| {
                    t.with_timezone(&Shanghai)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                }),
            None => None,
        };

        SchedulerStatus {
            enabled: state.enabled,
            trigger_time: state.trigger_time.format("%H:%M").to_string(),
            next_fire,
            is_running: self.orchestrator.is_running(),
            last_report: state.last_report.clone(),
        }
    }
}
