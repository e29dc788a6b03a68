//! 反向地理编码服务

use crate::app::cache::{EntityTag, QueryKey, QueryOptions};
use crate::app::client::AppContext;
use crate::app::nearby::GeoPoint;
use crate::app::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const TOKEN_FUNCTION: &str = "get-mapbox-token";
const TOKEN_STALE_TIME: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// 从地理编码响应中取出第一个地点的名称
pub fn city_from_geocode(response: &Value) -> Option<String> {
    response
        .get("features")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub struct GeocodingService {
    ctx: Arc<AppContext>,
}

impl GeocodingService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn token_key() -> QueryKey {
        QueryKey::new(EntityTag::GeocodingToken)
    }

    /// 地图服务令牌，缓存 1 小时
    pub async fn token(&self) -> Result<String> {
        self.ctx
            .query
            .fetch(
                QueryOptions::new(Self::token_key()).stale_time(TOKEN_STALE_TIME),
                || async {
                    let response = self
                        .ctx
                        .backend
                        .invoke(TOKEN_FUNCTION, json!({}))
                        .await
                        .context("获取地图令牌失败")?;
                    let parsed: TokenResponse =
                        serde_json::from_value(response).context("解析地图令牌失败")?;
                    Ok::<_, anyhow::Error>(parsed.token)
                },
            )
            .await
            .into_result()
    }

    /// 根据坐标查询所在城市；服务商没有结果时返回 `None`
    pub async fn reverse_geocode(&self, point: GeoPoint) -> Result<Option<String>> {
        let token = self.token().await?;
        let url = format!(
            "{}/{},{}.json",
            self.ctx.config.geocoding_base_url.trim_end_matches('/'),
            point.longitude,
            point.latitude
        );
        debug!("[Geocoding] 🌍 反向地理编码: {}", url);

        let response = self
            .ctx
            .http
            .get(&url)
            .query(&[
                ("access_token", token.as_str()),
                ("types", "place"),
                ("limit", "1"),
            ])
            .send()
            .await
            .context("反向地理编码请求失败")?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("[Geocoding] 地图令牌已失效，下次请求重新获取");
            self.ctx.query.invalidate_key(&Self::token_key());
        }

        let body: Value = handle_http_response(response, "反向地理编码").await?;
        Ok(city_from_geocode(&body))
    }
}
