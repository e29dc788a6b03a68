//! 附近的人服务：位置缺失时不查询，按固定间隔轮询刷新

use crate::app::backend::Backend;
use crate::app::cache::{EntityTag, QueryKey, QueryOptions, QueryResult, Subscription};
use crate::app::client::AppContext;
use crate::app::error::SdkError;
use crate::app::nearby::models::{GeoPoint, NearbyUser};
use crate::app::types::decode_rows;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const NEARBY_RPC: &str = "get_nearby_users";

/// 未指定半径且筛选条件也为空时使用
pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const NEARBY_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
const NEARBY_STALE_TIME: Duration = Duration::from_secs(5 * 60);

fn nearby_key(viewer: Option<&str>, point: GeoPoint, radius_km: f64) -> QueryKey {
    QueryKey::new(EntityTag::NearbyUser)
        .part(viewer.unwrap_or_default())
        .part(format!("{:.4}", point.latitude))
        .part(format!("{:.4}", point.longitude))
        .part(format!("{:.1}", radius_km))
        .also(EntityTag::Profile)
}

async fn fetch_nearby(
    backend: Arc<dyn Backend>,
    me: Option<String>,
    point: GeoPoint,
    radius_km: f64,
) -> Result<Vec<NearbyUser>> {
    let result = backend
        .rpc(
            NEARBY_RPC,
            json!({
                "user_lat": point.latitude,
                "user_lng": point.longitude,
                "radius_km": radius_km,
            }),
        )
        .await
        .context("查询附近的人失败")?;
    let rows = match result {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let mut users: Vec<NearbyUser> = decode_rows::<NearbyUser>(rows, "附近的人")?
        .into_iter()
        .filter(|u| me.as_deref() != Some(u.id.as_str()))
        .collect();
    users.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    debug!(
        "[NearbySvc] ({:.4}, {:.4}) {}km 内共 {} 人",
        point.latitude,
        point.longitude,
        radius_km,
        users.len()
    );
    Ok(users)
}

pub struct NearbyService {
    ctx: Arc<AppContext>,
}

impl NearbyService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn radius(&self, radius_km: Option<f64>) -> f64 {
        radius_km
            .or(self.ctx.filters.get().radius_km)
            .filter(|r| *r > 0.0)
            .unwrap_or(DEFAULT_RADIUS_KM)
    }

    /// 查询附近的人；`location` 为空或无效时查询不启用
    pub async fn nearby_users(
        &self,
        location: Option<GeoPoint>,
        radius_km: Option<f64>,
    ) -> QueryResult<Vec<NearbyUser>> {
        let Some(point) = location.filter(GeoPoint::is_valid) else {
            debug!("[NearbySvc] 缺少有效位置，跳过查询");
            return QueryResult::idle();
        };
        let radius_km = self.radius(radius_km);
        let me = self.ctx.auth.user_id();
        self.ctx
            .query
            .fetch(
                QueryOptions::new(nearby_key(me.as_deref(), point, radius_km))
                    .stale_time(NEARBY_STALE_TIME),
                || fetch_nearby(self.ctx.backend.clone(), me.clone(), point, radius_km),
            )
            .await
    }

    /// 每 5 分钟刷新一次附近的人
    pub fn watch_nearby_users(
        &self,
        location: GeoPoint,
        radius_km: Option<f64>,
    ) -> Result<Subscription<Vec<NearbyUser>>> {
        if !location.is_valid() {
            return Err(SdkError::InvalidInput(format!(
                "invalid location ({}, {})",
                location.latitude, location.longitude
            ))
            .into());
        }
        let radius_km = self.radius(radius_km);
        let backend = self.ctx.backend.clone();
        let me = self.ctx.auth.user_id();
        Ok(Subscription::poll(
            self.ctx.query.clone(),
            QueryOptions::new(nearby_key(me.as_deref(), location, radius_km))
                .stale_time(NEARBY_STALE_TIME),
            NEARBY_POLL_INTERVAL,
            move || fetch_nearby(backend.clone(), me.clone(), location, radius_km),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::test_support::*;
    use crate::app::testing::Call;
    use crate::app::SessionUser;

    #[tokio::test]
    async fn missing_location_disables_query() {
        let (client, backend, _) = signed_in_client("me");
        let result = client.nearby().nearby_users(None, Some(5.0)).await;
        assert!(result.data.is_none());
        assert!(!result.is_loading);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn nearby_users_excludes_self_and_sorts_by_distance() {
        let (client, backend, _) = signed_in_client("me");
        backend.respond(
            "rpc:get_nearby_users",
            json!([
                { "id": "far", "distance_km": 8.2 },
                { "id": "me", "distance_km": 0.0 },
                { "id": "near", "distance_km": 0.4 },
            ]),
        );

        let point = GeoPoint::new(31.2304, 121.4737);
        let users = client
            .nearby()
            .nearby_users(Some(point), None)
            .await
            .data
            .unwrap();
        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);

        assert_eq!(
            backend.calls_to("rpc:get_nearby_users"),
            vec![Call::Rpc {
                name: "get_nearby_users".to_string(),
                args: json!({ "user_lat": 31.2304, "user_lng": 121.4737, "radius_km": DEFAULT_RADIUS_KM }),
            }]
        );
    }

    #[tokio::test]
    async fn nearby_results_are_cached_per_viewer() {
        let (client, backend, _) = signed_in_client("me");
        backend.respond(
            "rpc:get_nearby_users",
            json!([{ "id": "me", "distance_km": 0.0 }, { "id": "other", "distance_km": 1.0 }]),
        );
        let point = GeoPoint::new(1.0, 2.0);
        let mine = client.nearby().nearby_users(Some(point), None).await;
        assert_eq!(mine.data.unwrap()[0].id, "other");

        client.sign_in(SessionUser {
            id: "other".to_string(),
            email: None,
            access_token: "token-other".to_string(),
        });
        let theirs = client.nearby().nearby_users(Some(point), None).await;
        let ids: Vec<String> = theirs.data.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["me".to_string()]);
        assert_eq!(backend.call_count("rpc:get_nearby_users"), 2);
    }

    #[tokio::test]
    async fn radius_falls_back_to_filters() {
        let (client, backend, _) = signed_in_client("me");
        client.filters().update(|f| f.radius_km = Some(3.0));
        client
            .nearby()
            .nearby_users(Some(GeoPoint::new(1.0, 2.0)), None)
            .await;
        let calls = backend.calls_to("rpc:get_nearby_users");
        let Call::Rpc { args, .. } = &calls[0] else {
            panic!("expected rpc");
        };
        assert_eq!(args["radius_km"], json!(3.0));
    }

    #[tokio::test]
    async fn profile_update_invalidates_nearby_results() {
        let (client, backend, _) = signed_in_client("me");
        let point = GeoPoint::new(1.0, 2.0);
        client.nearby().nearby_users(Some(point), None).await;
        client.query_client().invalidate_tag(EntityTag::Profile);
        client.nearby().nearby_users(Some(point), None).await;
        assert_eq!(backend.call_count("rpc:get_nearby_users"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_nearby_polls_every_five_minutes() {
        let (client, backend, _) = signed_in_client("me");
        let mut sub = client
            .nearby()
            .watch_nearby_users(GeoPoint::new(1.0, 2.0), Some(2.0))
            .unwrap();
        sub.changed().await.unwrap();
        tokio::time::advance(NEARBY_POLL_INTERVAL).await;
        sub.changed().await.unwrap();
        assert_eq!(backend.call_count("rpc:get_nearby_users"), 2);
    }
}
