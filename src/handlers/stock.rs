use actix_web::{web, HttpResponse, Result};

use super::{bad_request, store_error, AppState};
use crate::error::RunError;
use crate::models::{
    validate_codes_limit, ApiResponse, CollectionRunReport, HistoryCollectRequest, RunOutcome,
    StockCodesQuery, StockSearchQuery, STOCK_CODE_RE,
};
use crate::services::store::SearchFilter;

/// 运行报告的 HTTP 响应，存储不可用导致中止时返回 503 并附带部分报告
pub(crate) fn report_response(report: CollectionRunReport, message: &str) -> HttpResponse {
    if report.outcome == RunOutcome::AbortedStoreUnavailable {
        let details = format!(
            "存储不可用，运行已中止，已处理 {} 个工作单元",
            report.total
        );
        return HttpResponse::ServiceUnavailable()
            .json(ApiResponse::error_with_data("存储不可用", details, report));
    }
    HttpResponse::Ok().json(ApiResponse::success(report, message))
}

pub(crate) fn run_error(e: RunError) -> HttpResponse {
    match e {
        RunError::AlreadyRunning => {
            HttpResponse::Conflict().json(ApiResponse::<()>::error("采集任务冲突", e.to_string()))
        }
        RunError::Interrupted(_) => {
            log::error!("{}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("服务器内部错误", e.to_string()))
        }
    }
}

pub async fn get_stock_codes(
    state: web::Data<AppState>,
    query: web::Query<StockCodesQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let limit = match validate_codes_limit(query.limit) {
        Ok(limit) => limit,
        Err(msg) => return Ok(bad_request(msg)),
    };

    match state.store.all_codes(query.market_type).await {
        Ok(mut codes) => {
            codes.truncate(limit);
            let total = codes.len();
            log::info!("成功返回 {} 个股票代码", total);
            Ok(HttpResponse::Ok().json(ApiResponse::list(codes, total, "获取股票代码成功")))
        }
        Err(e) => Ok(store_error(e)),
    }
}

pub async fn collect_history(
    state: web::Data<AppState>,
    body: web::Json<HistoryCollectRequest>,
) -> Result<HttpResponse> {
    let params = match body.into_inner().validate() {
        Ok(params) => params,
        Err(msg) => return Ok(bad_request(msg)),
    };
    log::info!(
        "收到历史数据采集请求: {} ~ {}，复权方式 {}，股票数量 {}",
        params.start_date,
        params.end_date,
        params.adjust_flag,
        params
            .stock_codes
            .as_ref()
            .map_or("全部".to_string(), |c| c.len().to_string())
    );

    // 客户端断开不会中断采集
    match state.orchestrator.spawn_history(params).await {
        Ok(report) => Ok(report_response(report, "历史数据采集完成")),
        Err(e) => Ok(run_error(e)),
    }
}

pub async fn get_stock(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let code = path.into_inner();
    if !STOCK_CODE_RE.is_match(&code) {
        return Ok(bad_request(format!("股票代码格式错误: {}", code)));
    }

    match state.store.get(&code).await {
        Ok(record) => Ok(HttpResponse::Ok().json(ApiResponse::success(record, "获取行情成功"))),
        Err(e) => Ok(store_error(e)),
    }
}

pub async fn search_stocks(
    state: web::Data<AppState>,
    query: web::Query<StockSearchQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let filter = SearchFilter {
        stock_code: query.stock_code.clone(),
        market_type: query.market_type,
    };

    match state.store.search(&filter, query.size()).await {
        Ok(records) => {
            let total = records.len();
            Ok(HttpResponse::Ok().json(ApiResponse::list(records, total, "检索行情成功")))
        }
        Err(e) => Ok(store_error(e)),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/stocks")
            .route("", web::get().to(search_stocks))
            .route("/codes", web::get().to(get_stock_codes))
            .route("/{code}", web::get().to(get_stock)),
    )
    .route("/history/collect", web::post().to(collect_history));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{state, StaticFetcher};
    use crate::config::StoreConfig;
    use crate::services::store::{ElasticsearchStore, MemoryStore};
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    macro_rules! app {
        ($data:expr) => {
            test::init_service(
                App::new()
                    .app_data($data.clone())
                    .configure(crate::handlers::config),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_collect_history_partial_failure_is_200() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        let app = app!(data);

        let req = test::TestRequest::post()
            .uri("/api/v1/history/collect")
            .set_json(json!({
                "start_date": "2024-01-01",
                "end_date": "2024-01-05",
                "stock_codes": ["000001", "000002"]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["succeeded"], 1);
        assert_eq!(body["data"]["failed"], 1);
        assert_eq!(body["data"]["adjust_flag"], "qfq");
        assert_eq!(body["data"]["stock_codes_count"], 2);
        assert_eq!(body["data"]["failures"][0]["unit"], "000002");
        assert_eq!(body["data"]["outcome"], "completed");
    }

    #[actix_web::test]
    async fn test_collect_history_store_unavailable_is_503() {
        let config = StoreConfig {
            port: 1,
            timeout_secs: 2,
            ..StoreConfig::default()
        };
        let store = Arc::new(ElasticsearchStore::new(&config).unwrap());
        let data = state(Arc::new(StaticFetcher), store).await;
        let app = app!(data);

        let req = test::TestRequest::post()
            .uri("/api/v1/history/collect")
            .set_json(json!({"start_date": "2024-01-01", "end_date": "2024-01-05"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["outcome"], "aborted_store_unavailable");
        assert_eq!(body["data"]["total"], 0);
    }

    #[actix_web::test]
    async fn test_collect_history_validation() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        let app = app!(data);

        let cases = [
            json!({"end_date": "2024-01-05"}),
            json!({"start_date": "2024-01-10", "end_date": "2024-01-05"}),
            json!({"start_date": "2024/01/01", "end_date": "2024-01-05"}),
            json!({"start_date": "2024-01-01", "end_date": "2024-01-05", "adjust_flag": "xyz"}),
            json!({"start_date": "2024-01-01", "end_date": "2024-01-05", "stock_codes": ["1"]}),
        ];
        for case in cases {
            let req = test::TestRequest::post()
                .uri("/api/v1/history/collect")
                .set_json(case)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "参数验证失败");
        }

        let req = test::TestRequest::post()
            .uri("/api/v1/history/collect")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_codes_and_lookup_after_snapshot() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        data.orchestrator.run_snapshot().await.unwrap();
        let app = app!(data);

        let req = test::TestRequest::get()
            .uri("/api/v1/stocks/codes?limit=10")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"], json!(["000001", "600000"]));

        let req = test::TestRequest::get()
            .uri("/api/v1/stocks/codes?market_type=SH")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"], json!(["600000"]));

        let req = test::TestRequest::get().uri("/api/v1/stocks/600000").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["market_type"], "SH");
        assert_eq!(body["data"]["data_source"], "static_sh_a_spot");

        let req = test::TestRequest::get().uri("/api/v1/stocks/999999").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let req = test::TestRequest::get()
            .uri("/api/v1/stocks?market_type=SZ")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["stock_code"], "000001");
    }

    #[actix_web::test]
    async fn test_codes_limit_validation() {
        let data = state(Arc::new(StaticFetcher), Arc::new(MemoryStore::new())).await;
        let app = app!(data);

        for uri in [
            "/api/v1/stocks/codes?limit=0",
            "/api/v1/stocks/codes?limit=10001",
            "/api/v1/stocks/codes?limit=abc",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400, "{}", uri);
        }
    }
}
