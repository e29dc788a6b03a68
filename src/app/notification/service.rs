//! 通知服务：列表、未读数与定时轮询

use crate::app::backend::{Backend, Filter, SelectRequest};
use crate::app::cache::{
    EntityTag, MutationOptions, QueryKey, QueryOptions, QueryResult, Subscription,
};
use crate::app::client::AppContext;
use crate::app::notification::models::Notification;
use crate::app::types::decode_rows;
use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const NOTIFICATIONS_TABLE: &str = "notifications";
const LIST_LIMIT: usize = 50;

/// 未读数轮询间隔
pub const UNREAD_POLL_INTERVAL: Duration = Duration::from_secs(30);

fn unread_key(user_id: &str) -> QueryKey {
    QueryKey::new(EntityTag::Notification)
        .part("unread")
        .part(user_id)
}

async fn count_unread(backend: Arc<dyn Backend>, user_id: String) -> Result<u64> {
    let filters = [
        Filter::eq("user_id", user_id.as_str()),
        Filter::eq("read", false),
    ];
    let count = backend
        .count(NOTIFICATIONS_TABLE, &filters)
        .await
        .context("加载未读通知数失败")?;
    debug!("[NotificationSvc] 用户 {} 未读通知: {}", user_id, count);
    Ok(count)
}

pub struct NotificationService {
    ctx: Arc<AppContext>,
}

impl NotificationService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 最近 50 条通知，新的在前
    pub async fn notifications(&self) -> QueryResult<Vec<Notification>> {
        let Some(me) = self.ctx.auth.user_id() else {
            return QueryResult::idle();
        };
        let request = SelectRequest::new(NOTIFICATIONS_TABLE)
            .filter(Filter::eq("user_id", me.as_str()))
            .order("created_at", false)
            .limit(LIST_LIMIT);
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Notification).part("list").part(&me)),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载通知失败")?;
                    decode_rows::<Notification>(rows, "通知")
                },
            )
            .await
    }

    pub async fn unread_count(&self) -> QueryResult<u64> {
        let Some(me) = self.ctx.auth.user_id() else {
            return QueryResult::idle();
        };
        self.ctx
            .query
            .fetch(QueryOptions::new(unread_key(&me)), || {
                count_unread(self.ctx.backend.clone(), me.clone())
            })
            .await
    }

    /// 每 30 秒刷新一次未读数，订阅被 drop 时停止
    pub fn watch_unread_count(&self) -> Result<Subscription<u64>> {
        let me = self.ctx.require_user_id()?;
        let backend = self.ctx.backend.clone();
        Ok(Subscription::poll(
            self.ctx.query.clone(),
            QueryOptions::new(unread_key(&me)),
            UNREAD_POLL_INTERVAL,
            move || count_unread(backend.clone(), me.clone()),
        ))
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<()> {
        let me = self.ctx.require_user_id()?;
        self.ctx
            .query
            .mutate(
                MutationOptions::new("标记通知已读", &[EntityTag::Notification]),
                || async {
                    self.ctx
                        .backend
                        .update(
                            NOTIFICATIONS_TABLE,
                            &[
                                Filter::eq("id", notification_id),
                                Filter::eq("user_id", me.as_str()),
                            ],
                            json!({ "read": true }),
                        )
                        .await
                        .context("标记通知已读失败")?;
                    Ok(())
                },
            )
            .await
    }

    pub async fn mark_all_read(&self) -> Result<usize> {
        let me = self.ctx.require_user_id()?;
        self.ctx
            .query
            .mutate(
                MutationOptions::new("全部标为已读", &[EntityTag::Notification])
                    .success("已全部标为已读"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .update(
                            NOTIFICATIONS_TABLE,
                            &[
                                Filter::eq("user_id", me.as_str()),
                                Filter::eq("read", false),
                            ],
                            json!({ "read": true }),
                        )
                        .await
                        .context("全部标为已读失败")?;
                    Ok(rows.len())
                },
            )
            .await
    }
}
