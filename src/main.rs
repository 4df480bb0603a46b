//! A 股行情采集服务
//!
//! 每日定时采集沪深两市 A 股行情快照写入 Elasticsearch，
//! 并提供按日期区间采集日K线的 RESTful API
//! 数据来源：东方财富

mod config;     // 配置
mod error;      // 错误类型
mod handlers;   // HTTP 请求处理器
mod middleware; // 中间件
mod models;     // 数据模型定义
mod services;   // 业务逻辑服务

use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::middleware::ApiKeyMiddleware;
use crate::services::eastmoney::EastMoneyFetcher;
use crate::services::orchestrator::Orchestrator;
use crate::services::scheduler::Scheduler;
use crate::services::store::build_store;

/// 应用程序入口
///
/// 加载配置，初始化存储和定时任务后启动 HTTP 服务器
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 日志级别来自配置，RUST_LOG 优先
    let config = AppConfig::load()?;
    env_logger::init_from_env(Env::default().default_filter_or(config.log.level.as_str()));

    log::info!("启动 A 股行情采集服务 v{}", env!("CARGO_PKG_VERSION"));
    log::info!("配置来源: {}", config.source());
    if config.api.api_key.is_empty() {
        log::warn!("未设置 API_KEY，接口认证已关闭");
    }

    let store = build_store(&config.store)?;
    match store.ensure_indices().await {
        Ok(()) => log::info!("存储索引已就绪"),
        Err(e) => log::warn!("初始化存储索引失败: {}", e),
    }

    let fetcher = Arc::new(EastMoneyFetcher::new(&config.api)?);
    let orchestrator = Arc::new(Orchestrator::new(
        fetcher,
        store.clone(),
        config.collector.clone(),
    ));
    let scheduler = Scheduler::new(orchestrator.clone(), &config.scheduler).await?;
    scheduler.launch().await?;

    let state = web::Data::new(AppState {
        store,
        orchestrator,
        scheduler: scheduler.clone(),
    });
    let api_key = config.api.api_key.clone();

    log::info!("HTTP 服务监听 {}", config.bind_addr());
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default()) // 请求日志
            .wrap(ApiKeyMiddleware::new(api_key.clone())) // API Key 认证
            .configure(handlers::config) // 配置路由
    });
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    // HttpServer 自行处理 SIGINT/SIGTERM，返回后关闭调度器
    server.bind(config.bind_addr())?.run().await?;

    log::info!("HTTP 服务已停止，关闭定时任务");
    scheduler.shutdown().await;

    log::info!("服务已退出");
    Ok(())
}
