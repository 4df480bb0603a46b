pub mod health;
pub mod scheduler;
pub mod stock;

use actix_web::{error, web, HttpResponse};
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::ApiResponse;
use crate::services::orchestrator::Orchestrator;
use crate::services::scheduler::Scheduler;
use crate::services::store::StoreGateway;

/// 处理器共享状态
pub struct AppState {
    pub store: Arc<dyn StoreGateway>,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<Scheduler>,
}

pub(crate) fn bad_request(details: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()>::error("参数验证失败", details))
}

pub(crate) fn store_error(e: StoreError) -> HttpResponse {
    match e {
        StoreError::Unavailable(_) => HttpResponse::ServiceUnavailable()
            .json(ApiResponse::<()>::error("存储不可用", e.to_string())),
        StoreError::NotFound(_) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("数据不存在", e.to_string()))
        }
        StoreError::Rejected(_) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error("服务器内部错误", e.to_string())),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    // 请求体和查询参数解析失败统一返回 400 响应结构
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let response = bad_request(err.to_string());
        error::InternalError::from_response(err, response).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let response = bad_request(err.to_string());
        error::InternalError::from_response(err, response).into()
    }))
    .configure(health::config)
    .service(
        web::scope("/api/v1")
            .configure(health::config)
            .configure(stock::config)
            .configure(scheduler::config),
    );
}
