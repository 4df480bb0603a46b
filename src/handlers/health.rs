use actix_web::{web, HttpResponse, Result};

use super::AppState;
use crate::models::{get_beijing_time, HealthResponse};

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let store_ok = state.store.ping().await;
    let quote_count = if store_ok {
        state.store.count().await.ok()
    } else {
        None
    };
    let response = HealthResponse {
        status: if store_ok { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: get_beijing_time().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: if store_ok { "connected" } else { "disconnected" }.to_string(),
        quote_count,
    };

    if store_ok {
        Ok(HttpResponse::Ok().json(response))
    } else {
        log::warn!("健康检查失败: 存储不可达");
        Ok(HttpResponse::ServiceUnavailable().json(response))
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
