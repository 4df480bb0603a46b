//! Elasticsearch 存储实现
//!
//! 通过 REST 接口读写：单条覆盖用 `PUT /{index}/_doc/{id}`，批量用 `_bulk`，
//! 代码枚举用 search_after 分页

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::{SearchFilter, StoreGateway};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{DailyBar, MarketType, StockQuoteRecord};

/// 代码枚举每页数量
const CODES_PAGE_SIZE: usize = 1000;

pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
    quote_index: String,
    daily_index: String,
    batch_size: usize,
}

impl ElasticsearchStore {
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
            username: config.username.clone(),
            password: config.password.clone(),
            quote_index: config.quote_index.clone(),
            daily_index: config.daily_index.clone(),
            batch_size: config.batch_size.max(1),
        })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Rejected(format!("无效的请求路径 {}: {}", path, e)))
    }

    fn auth(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.username, Some(&self.password))
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = self.auth(builder).send().await?;
        classify_status(response).await
    }

    async fn create_index_if_missing(&self, index: &str, mapping: Value) -> Result<(), StoreError> {
        let url = self.url(index)?;
        let response = self.auth(self.client.head(url.clone())).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                log::info!("创建索引: {}", index);
                self.send(self.client.put(url).json(&mapping)).await?;
                Ok(())
            }
            s if s.is_success() => Ok(()),
            s => Err(StoreError::Unavailable(format!("检查索引 {} 失败: {}", index, s))),
        }
    }

    /// 按批次执行 `_bulk` 写入，整批请求失败时该批所有文档得到同一个错误
    ///
    /// 存储不可用时不再发送剩余批次，剩余文档直接记为同一个不可用错误
    async fn bulk_index<T: Serialize + Sync>(
        &self,
        index: &str,
        docs: &[(String, &T)],
    ) -> Vec<Result<(), StoreError>> {
        let mut outcomes = Vec::with_capacity(docs.len());

        for chunk in docs.chunks(self.batch_size) {
            match self.bulk_chunk(index, chunk).await {
                Ok(results) => outcomes.extend(results),
                Err(e @ StoreError::Unavailable(_)) => {
                    log::error!(
                        "索引 {} 批量写入中止，剩余 {} 条未发送: {}",
                        index,
                        docs.len() - outcomes.len() - chunk.len(),
                        e
                    );
                    outcomes.resize(docs.len(), Err(e));
                    return outcomes;
                }
                Err(e) => outcomes.extend(chunk.iter().map(|_| Err(e.clone()))),
            }
        }

        let ok = outcomes.iter().filter(|o| o.is_ok()).count();
        log::info!("索引 {} 批量写入: 成功 {} 条, 失败 {} 条", index, ok, outcomes.len() - ok);

        if ok > 0 {
            if let Err(e) = self.refresh(index).await {
                log::warn!("刷新索引 {} 失败: {}", index, e);
            }
        }

        outcomes
    }

    async fn bulk_chunk<T: Serialize + Sync>(
        &self,
        index: &str,
        chunk: &[(String, &T)],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        let body = build_bulk_body(index, chunk)?;
        let response = self
            .send(
                self.client
                    .post(self.url("_bulk")?)
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;

        let value: Value = response.json().await?;
        parse_bulk_response(&value, chunk.len())
    }

    async fn refresh(&self, index: &str) -> Result<(), StoreError> {
        self.send(self.client.post(self.url(&format!("{}/_refresh", index))?))
            .await
            .map(|_| ())
    }

    async fn search_raw(&self, body: &Value) -> Result<Value, StoreError> {
        let url = self.url(&format!("{}/_search", self.quote_index))?;
        Ok(self.send(self.client.post(url).json(body)).await?.json().await?)
    }
}

/// 按状态码归类存储错误：连接层和 5xx/429 视为不可用，其余 4xx 视为文档被拒
async fn classify_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{}: {}", status, truncate(&body, 300));
    Err(status_error(status, detail))
}

fn status_error(status: StatusCode, detail: String) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(detail)
    } else if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(detail)
    } else {
        StoreError::Rejected(detail)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 组装 `_bulk` 请求体（NDJSON，每个文档一行 action 一行 source）
fn build_bulk_body<T: Serialize>(index: &str, docs: &[(String, &T)]) -> Result<String, StoreError> {
    let mut body = String::new();
    for (id, doc) in docs {
        let action = json!({ "index": { "_index": index, "_id": id } });
        let source = serde_json::to_string(doc)
            .map_err(|e| StoreError::Rejected(format!("文档 {} 序列化失败: {}", id, e)))?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

/// 解析 `_bulk` 响应，逐条映射结果
fn parse_bulk_response(value: &Value, expected: usize) -> Result<Vec<Result<(), StoreError>>, StoreError> {
    let items = value["items"]
        .as_array()
        .ok_or_else(|| StoreError::Unavailable("bulk 响应缺少 items".to_string()))?;

    if items.len() != expected {
        return Err(StoreError::Unavailable(format!(
            "bulk 响应条数不符: 期望 {}, 实际 {}",
            expected,
            items.len()
        )));
    }

    Ok(items
        .iter()
        .map(|item| {
            let result = &item["index"];
            let status = result["status"].as_u64().unwrap_or(0) as u16;
            if (200..300).contains(&status) {
                Ok(())
            } else {
                let reason = result["error"]["reason"].as_str().unwrap_or("unknown").to_string();
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
                log::warn!("文档 {} 写入失败: {}", result["_id"], reason);
                Err(status_error(status, reason))
            }
        })
        .collect())
}

/// 组装检索条件
fn build_search_query(filter: &SearchFilter) -> Value {
    let mut must = Vec::new();
    if let Some(code) = &filter.stock_code {
        must.push(json!({ "term": { "stock_code": code } }));
    }
    if let Some(market) = filter.market_type {
        must.push(json!({ "term": { "market_type": market.as_str() } }));
    }

    if must.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "must": must } })
    }
}

fn hits(value: &Value) -> &[Value] {
    value["hits"]["hits"].as_array().map(|v| v.as_slice()).unwrap_or(&[])
}

/// 行情索引中的数值字段
const QUOTE_NUMERIC_FIELDS: [&str; 15] = [
    "current_price", "change_percent", "change_amount", "volume", "turnover",
    "amplitude", "highest_price", "lowest_price", "opening_price", "previous_close",
    "volume_ratio", "pe_ratio", "pb_ratio", "total_market_value", "circulating_market_value",
];

/// 日线索引中的数值字段
const DAILY_NUMERIC_FIELDS: [&str; 11] = [
    "open_price", "close_price", "high_price", "low_price", "prev_close_price", "volume",
    "amount", "amplitude", "change_percent", "change_amount", "turnover_rate",
];

fn index_body(mut properties: serde_json::Map<String, Value>, numeric: &[&str]) -> Value {
    for field in numeric {
        properties.insert(field.to_string(), json!({ "type": "double" }));
    }
    properties.insert("market_type".to_string(), json!({ "type": "keyword" }));
    properties.insert("data_source".to_string(), json!({ "type": "keyword" }));
    properties.insert(
        "update_time".to_string(),
        json!({ "type": "date", "format": "yyyy-MM-dd HH:mm:ss" }),
    );

    json!({
        "settings": { "number_of_shards": 1, "number_of_replicas": 0 },
        "mappings": { "properties": properties }
    })
}

/// 行情索引 mapping
pub fn quote_mapping() -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("stock_code".to_string(), json!({ "type": "keyword" }));
    properties.insert(
        "stock_name".to_string(),
        json!({ "type": "text", "fields": { "keyword": { "type": "keyword" } } }),
    );
    index_body(properties, &QUOTE_NUMERIC_FIELDS)
}

/// 日线索引 mapping
pub fn daily_mapping() -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("stock_code".to_string(), json!({ "type": "keyword" }));
    properties.insert("date".to_string(), json!({ "type": "date", "format": "yyyy-MM-dd" }));
    properties.insert("adjust_flag".to_string(), json!({ "type": "keyword" }));
    index_body(properties, &DAILY_NUMERIC_FIELDS)
}

#[async_trait]
impl StoreGateway for ElasticsearchStore {
    async fn ping(&self) -> bool {
        match self.url("") {
            Ok(url) => self.send(self.client.get(url)).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn ensure_indices(&self) -> Result<(), StoreError> {
        self.create_index_if_missing(&self.quote_index, quote_mapping()).await?;
        self.create_index_if_missing(&self.daily_index, daily_mapping()).await
    }

    async fn upsert_one(&self, record: &StockQuoteRecord) -> Result<(), StoreError> {
        let url = self.url(&format!("{}/_doc/{}", self.quote_index, record.stock_code))?;
        self.send(self.client.put(url).json(record)).await.map(|_| ())
    }

    async fn upsert_many(&self, records: &[StockQuoteRecord]) -> Vec<Result<(), StoreError>> {
        let docs: Vec<(String, &StockQuoteRecord)> =
            records.iter().map(|r| (r.stock_code.clone(), r)).collect();
        self.bulk_index(&self.quote_index, &docs).await
    }

    async fn upsert_bars(&self, bars: &[DailyBar]) -> Vec<Result<(), StoreError>> {
        let docs: Vec<(String, &DailyBar)> = bars.iter().map(|b| (b.doc_id(), b)).collect();
        self.bulk_index(&self.daily_index, &docs).await
    }

    async fn get(&self, stock_code: &str) -> Result<StockQuoteRecord, StoreError> {
        let url = self.url(&format!("{}/_doc/{}", self.quote_index, stock_code))?;
        let value: Value = self.send(self.client.get(url)).await?.json().await?;

        serde_json::from_value(value["_source"].clone())
            .map_err(|e| StoreError::Rejected(format!("文档 {} 解析失败: {}", stock_code, e)))
    }

    async fn search(&self, filter: &SearchFilter, size: usize) -> Result<Vec<StockQuoteRecord>, StoreError> {
        let body = json!({
            "query": build_search_query(filter),
            "size": size,
            "sort": [{ "update_time": { "order": "desc" } }]
        });
        let value = self.search_raw(&body).await?;

        Ok(hits(&value)
            .iter()
            .filter_map(|hit| match serde_json::from_value(hit["_source"].clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("跳过无法解析的文档 {}: {}", hit["_id"], e);
                    None
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let url = self.url(&format!("{}/_count", self.quote_index))?;
        let value: Value = self.send(self.client.get(url)).await?.json().await?;
        value["count"]
            .as_u64()
            .ok_or_else(|| StoreError::Rejected("count 响应格式异常".to_string()))
    }

    async fn all_codes(&self, market: Option<MarketType>) -> Result<Vec<String>, StoreError> {
        let filter = SearchFilter {
            stock_code: None,
            market_type: market,
        };
        let mut codes: Vec<String> = Vec::new();
        let mut search_after: Option<Value> = None;

        loop {
            let mut body = json!({
                "query": build_search_query(&filter),
                "size": CODES_PAGE_SIZE,
                "_source": ["stock_code"],
                "sort": [{ "stock_code": { "order": "asc" } }]
            });
            if let Some(after) = &search_after {
                body["search_after"] = after.clone();
            }

            // 索引尚未创建时视为没有已知代码
            let value = match self.search_raw(&body).await {
                Ok(value) => value,
                Err(StoreError::NotFound(_)) => break,
                Err(e) => return Err(e),
            };
            let page = hits(&value);
            if page.is_empty() {
                break;
            }

            for hit in page {
                if let Some(code) = hit["_source"]["stock_code"].as_str() {
                    if codes.last().map(String::as_str) != Some(code) {
                        codes.push(code.to_string());
                    }
                }
            }

            if page.len() < CODES_PAGE_SIZE {
                break;
            }
            search_after = page.last().map(|hit| hit["sort"].clone());
        }

        log::info!("从 {} 获取到 {} 个股票代码", self.quote_index, codes.len());
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// 读完一个 HTTP 请求（请求头加 Content-Length 指定的请求体）
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// 对所有请求都返回 503 的本地服务，返回地址端口和请求计数
    async fn unavailable_server() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
                let _ = stream.shutdown().await;
            }
        });
        (port, requests)
    }

    #[tokio::test]
    async fn test_bulk_stops_after_store_unavailable() {
        let (port, requests) = unavailable_server().await;
        let config = StoreConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_secs: 5,
            batch_size: 100,
            ..StoreConfig::default()
        };
        let store = ElasticsearchStore::new(&config).unwrap();

        let docs: Vec<Value> = (0..250)
            .map(|i| json!({ "stock_code": format!("{:06}", i) }))
            .collect();
        let pairs: Vec<(String, &Value)> = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| (format!("{:06}", i), doc))
            .collect();

        let outcomes = store.bulk_index("stock_basic_data", &pairs).await;

        assert_eq!(outcomes.len(), 250);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, Err(StoreError::Unavailable(_)))));
        // 第一批失败后不再发送后续批次，也不刷新索引
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_bulk_body() {
        let doc = json!({ "stock_code": "000001", "current_price": null });
        let body = build_bulk_body("stock_basic_data", &[("000001".to_string(), &doc)]).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 2);
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_id"], "000001");
        assert_eq!(action["index"]["_index"], "stock_basic_data");
        assert!(lines[1].contains("\"current_price\":null"));
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_parse_bulk_response_per_item() {
        let value = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "000001", "status": 200 } },
                { "index": { "_id": "000002", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "bad field" } } },
                { "index": { "_id": "000003", "status": 503,
                    "error": { "reason": "shard unavailable" } } }
            ]
        });

        let outcomes = parse_bulk_response(&value, 3).unwrap();
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1], Err(StoreError::Rejected("bad field".to_string())));
        assert!(matches!(outcomes[2], Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_parse_bulk_response_mismatch() {
        let value = json!({ "items": [] });
        assert!(parse_bulk_response(&value, 1).is_err());
    }

    #[test]
    fn test_build_search_query() {
        assert_eq!(build_search_query(&SearchFilter::default()), json!({ "match_all": {} }));

        let query = build_search_query(&SearchFilter {
            stock_code: Some("600000".to_string()),
            market_type: Some(MarketType::SH),
        });
        assert_eq!(query["bool"]["must"][0]["term"]["stock_code"], "600000");
        assert_eq!(query["bool"]["must"][1]["term"]["market_type"], "SH");
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, String::new()),
            StoreError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new()),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn test_mappings_use_keyword_identity() {
        assert_eq!(quote_mapping()["mappings"]["properties"]["stock_code"]["type"], "keyword");
        assert_eq!(quote_mapping()["mappings"]["properties"]["pe_ratio"]["type"], "double");
        assert_eq!(daily_mapping()["mappings"]["properties"]["date"]["type"], "date");
        assert_eq!(daily_mapping()["mappings"]["properties"]["update_time"]["type"], "date");
    }
}
