//! `match-phone-contacts` 端点
//!
//! 请求：`POST`，`Authorization: Bearer <token>`，body `{ "phoneHashes": [..] }`。
//! 响应总是带 `matches` 数组：
//! - 成功 `200 { matches, total }`
//! - 输入为空或格式不对 `200 { matches: [] }`，不查目录
//! - 凭证缺失、无效、body 超过上限或查询失败 `400 { error, matches: [] }`

use crate::app::contacts::{ContactMatch, MatchResponse, MAX_PHONE_HASHES};
use crate::functions::directory::ContactDirectory;
use crate::functions::verifier::TokenVerifier;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const ROUTE_PATH: &str = "/match-phone-contacts";
/// 与托管平台云函数一致的路径，客户端 `invoke` 可以直接指向本服务
pub const FUNCTIONS_ROUTE_PATH: &str = "/functions/v1/match-phone-contacts";
/// 请求体上限，需容纳完整通讯录
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct MatchState {
    pub directory: Arc<dyn ContactDirectory>,
    pub verifier: Arc<dyn TokenVerifier>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContactMatchError {
    #[error("Unauthorized")]
    MissingCredential,

    #[error("Invalid or expired token")]
    InvalidCredential,

    #[error("Token verification failed: {0}")]
    Verification(String),

    #[error("Invalid request body: {0}")]
    Body(String),

    #[error("Lookup failed: {0}")]
    Lookup(String),
}

impl IntoResponse for ContactMatchError {
    fn into_response(self) -> Response {
        warn!("[ContactMatch] ❌ {}", self);
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string(), "matches": [] })),
        )
            .into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// 从原始 body 中取出哈希列表
///
/// 先截断到前 500 项，再丢弃非字符串和空串，最后去重并保持顺序。
pub fn parse_phone_hashes(body: &[u8]) -> Vec<String> {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };
    let Some(items) = value.get("phoneHashes").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .take(MAX_PHONE_HASHES)
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|hash| !hash.is_empty() && seen.insert(*hash))
        .map(str::to_string)
        .collect()
}

async fn match_contacts(
    State(state): State<MatchState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ContactMatchError> {
    let token = bearer_token(&headers).ok_or(ContactMatchError::MissingCredential)?;
    let caller = state
        .verifier
        .verify(token)
        .await
        .map_err(|e| ContactMatchError::Verification(format!("{:#}", e)))?
        .ok_or(ContactMatchError::InvalidCredential)?;
    let body = body.map_err(|e| ContactMatchError::Body(e.to_string()))?;

    let hashes = parse_phone_hashes(&body);
    if hashes.is_empty() {
        debug!("[ContactMatch] 用户 {} 提交了空列表", caller);
        return Ok(Json(json!({ "matches": [] })).into_response());
    }

    let matches: Vec<ContactMatch> = state
        .directory
        .find_by_phone_hashes(&hashes, &caller)
        .await
        .map_err(|e| ContactMatchError::Lookup(format!("{:#}", e)))?;
    info!(
        "[ContactMatch] 📇 用户 {} 提交 {} 个哈希，命中 {}",
        caller,
        hashes.len(),
        matches.len()
    );

    Ok(Json(MatchResponse {
        total: Some(matches.len()),
        matches,
    })
    .into_response())
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
}

pub fn router(state: MatchState) -> Router {
    Router::new()
        .route(ROUTE_PATH, post(match_contacts).options(preflight))
        .route(FUNCTIONS_ROUTE_PATH, post(match_contacts).options(preflight))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
