use actix_web::{web, HttpResponse, Result};

use super::stock::{report_response, run_error};
use super::{bad_request, AppState};
use crate::models::{ApiResponse, RescheduleRequest};

pub async fn get_status(state: web::Data<AppState>) -> Result<HttpResponse> {
    let status = state.scheduler.status().await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(status, "获取定时任务状态成功")))
}

/// 立即执行一次行情快照采集
pub async fn run_now(state: web::Data<AppState>) -> Result<HttpResponse> {
    log::info!("收到手动触发快照采集请求");
    match state.scheduler.run_now().await {
        Ok(report) => Ok(report_response(report, "行情快照采集完成")),
        Err(e) => Ok(run_error(e)),
    }
}

/// 启用每日定时采集
pub async fn start(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.scheduler.start().await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status, "定时任务已启动"))),
        Err(e) => Ok(scheduler_error(e)),
    }
}

/// 停用每日定时采集，正在进行的采集不受影响
pub async fn stop(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.scheduler.stop().await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status, "定时任务已停止"))),
        Err(e) => Ok(scheduler_error(e)),
    }
}

fn scheduler_error(e: anyhow::Error) -> HttpResponse {
    log::error!("定时任务操作失败: {}", e);
    HttpResponse::InternalServerError()
        .json(ApiResponse::<()>::error("定时任务操作失败", e.to_string()))
}

pub async fn reschedule(
    state: web::Data<AppState>,
    body: web::Json<RescheduleRequest>,
) -> Result<HttpResponse> {
    match state.scheduler.reschedule(&body.time).await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status, "定时任务时间已更新"))),
        Err(e) => Ok(bad_request(e.to_string())),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/scheduler")
            .route("/status", web::get().to(get_status))
            .route("/run", web::post().to(run_now))
            .route("/start", web::post().to(start))
            .route("/stop", web::post().to(stop))
            .route("/schedule", web::put().to(reschedule)),
    );
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{state, SlowFetcher, StaticFetcher};
    use crate::services::store::MemoryStore;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    #[actix_web::test]
    async fn test_run_now_and_status() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .configure(crate::handlers::config),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/scheduler/run").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["mode"], "snapshot");
        assert_eq!(body["data"]["succeeded"], 2);
        assert_eq!(body["data"]["records_stored"], 2);

        let req = test::TestRequest::get().uri("/api/v1/scheduler/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["trigger_time"], "15:30");
        assert_eq!(body["data"]["is_running"], false);
        assert_eq!(body["data"]["last_report"]["total"], 2);
    }

    #[actix_web::test]
    async fn test_reschedule() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .configure(crate::handlers::config),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/v1/scheduler/schedule")
            .set_json(json!({"time": "16:00"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["trigger_time"], "16:00");

        let req = test::TestRequest::put()
            .uri("/api/v1/scheduler/schedule")
            .set_json(json!({"time": "4pm"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_start_and_stop() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .configure(crate::handlers::config),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/scheduler/stop").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["enabled"], false);
        assert!(body["data"]["next_fire"].is_null());

        let req = test::TestRequest::get().uri("/api/v1/scheduler/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["enabled"], false);

        let req = test::TestRequest::post().uri("/api/v1/scheduler/start").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["enabled"], true);
        assert_eq!(body["data"]["trigger_time"], "15:30");
    }

    #[actix_web::test]
    async fn test_run_now_conflict_while_running() {
        let data = state(
            Arc::new(SlowFetcher(Duration::from_millis(300))),
            Arc::new(MemoryStore::new()),
        )
        .await;
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .configure(crate::handlers::config),
        )
        .await;

        let scheduler = data.scheduler.clone();
        let first = tokio::spawn(async move { scheduler.run_now().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let req = test::TestRequest::post().uri("/api/v1/scheduler/run").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "采集任务冲突");

        let req = test::TestRequest::post()
            .uri("/api/v1/history/collect")
            .set_json(json!({"start_date": "2024-01-01", "end_date": "2024-01-05"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);

        assert!(first.await.unwrap().is_ok());
    }
}
