//! 基于 reqwest 的 REST 后端实现

use crate::app::backend::{Backend, Filter, SelectRequest};
use crate::app::client::ClientConfig;
use crate::app::types::handle_http_response;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// REST 后端客户端
///
/// - 表：`{base}/rest/v1/{table}`
/// - RPC：`{base}/rest/v1/rpc/{name}`
/// - 云函数：`{base}/functions/v1/{name}`
pub struct RestBackend {
    client: reqwest::Client,
    api_base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    /// 根据配置创建客户端（anon key 通过 default_headers 自动添加）
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("apikey"),
                    reqwest::header::HeaderValue::from_str(&config.anon_key)
                        .context("无效的 anon key")?,
                );
                headers
            })
            .timeout(config.request_timeout)
            .build()
            .context("创建 HTTP 客户端失败")?;

        info!("[Backend] 创建 REST 后端客户端: {}", config.api_base_url);

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(config.access_token.clone()),
        })
    }

    fn bearer(&self) -> String {
        let token = self
            .access_token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_base_url, table)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let operation_id = Uuid::new_v4().to_string();
        debug!("[Backend] {} {} 操作ID: {}", method, url, operation_id);
        self.client
            .request(method, url)
            .header("Authorization", self.bearer())
            .header("x-operation-id", operation_id)
    }
}

fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::query_pair).collect()
}

/// 从 `Content-Range: 0-24/3573` 或 `*/0` 中取总数
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>> {
        let response = self
            .request(reqwest::Method::GET, &self.table_url(&request.table))
            .query(&request.query_pairs())
            .send()
            .await
            .with_context(|| format!("查询表 {} 请求失败", request.table))?;
        handle_http_response(response, &format!("查询 {} ", request.table)).await
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<Vec<Value>> {
        let response = self
            .request(reqwest::Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .with_context(|| format!("插入表 {} 请求失败", table))?;
        handle_http_response(response, &format!("插入 {} ", table)).await
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut query = vec![("select".to_string(), "id".to_string())];
        query.extend(filter_pairs(filters));
        let response = self
            .request(reqwest::Method::HEAD, &self.table_url(table))
            .header("Prefer", "count=exact")
            .query(&query)
            .send()
            .await
            .with_context(|| format!("统计表 {} 请求失败", table))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("统计 {} 失败: HTTP {}", table, status);
        }
        let range = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        debug!("[Backend] 统计 {} Content-Range: {}", table, range);
        content_range_total(&range)
            .with_context(|| format!("统计 {} 返回了无法解析的 Content-Range: {:?}", table, range))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        let response = self
            .request(reqwest::Method::PATCH, &self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&filter_pairs(filters))
            .json(&patch)
            .send()
            .await
            .with_context(|| format!("更新表 {} 请求失败", table))?;
        handle_http_response(response, &format!("更新 {} ", table)).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let response = self
            .request(reqwest::Method::DELETE, &self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&filter_pairs(filters))
            .send()
            .await
            .with_context(|| format!("删除表 {} 请求失败", table))?;
        handle_http_response(response, &format!("删除 {} ", table)).await
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.api_base_url, function);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&args)
            .send()
            .await
            .with_context(|| format!("RPC {} 请求失败", function))?;
        handle_http_response(response, &format!("RPC {} ", function)).await
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value> {
        let url = format!("{}/functions/v1/{}", self.api_base_url, function);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("云函数 {} 请求失败", function))?;
        handle_http_response(response, &format!("云函数 {} ", function)).await
    }

    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }
}
