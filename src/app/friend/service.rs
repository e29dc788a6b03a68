//! 好友服务

use crate::app::backend::{Filter, SelectRequest};
use crate::app::cache::{EntityTag, MutationOptions, QueryKey, QueryOptions, QueryResult};
use crate::app::client::AppContext;
use crate::app::error::SdkError;
use crate::app::friend::models::{
    accepted_friend_ids, shared_friend_ids, Friendship, FriendshipStatus,
};
use crate::app::types::{decode_first, decode_rows};
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

const FRIENDSHIPS_TABLE: &str = "friendships";

pub struct FriendService {
    ctx: Arc<AppContext>,
}

impl FriendService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 读取与某个用户相关的所有关系行（两个方向）
    async fn fetch_rows(&self, user_id: &str) -> Result<Vec<Friendship>> {
        let request = SelectRequest::new(FRIENDSHIPS_TABLE).filter(Filter::Or(vec![
            Filter::eq("user_id", user_id),
            Filter::eq("friend_user_id", user_id),
        ]));
        let rows = self
            .ctx
            .backend
            .select(&request)
            .await
            .with_context(|| format!("加载用户 {} 的好友关系失败", user_id))?;
        decode_rows::<Friendship>(rows, "好友关系")
    }

    async fn fetch_accepted(&self, user_id: &str) -> Result<BTreeSet<String>> {
        let rows = self.fetch_rows(user_id).await?;
        Ok(accepted_friend_ids(&rows, user_id))
    }

    /// 某个用户的全部关系行
    pub async fn friendships(&self, user_id: &str) -> QueryResult<Vec<Friendship>> {
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Friendship).part("rows").part(user_id))
                    .enabled(!user_id.is_empty()),
                || self.fetch_rows(user_id),
            )
            .await
    }

    /// 某个用户的已接受好友 ID
    pub async fn accepted_friend_ids(&self, user_id: &str) -> QueryResult<BTreeSet<String>> {
        self.ctx
            .query
            .fetch(
                QueryOptions::new(
                    QueryKey::new(EntityTag::Friendship)
                        .part("accepted")
                        .part(user_id),
                )
                .enabled(!user_id.is_empty()),
                || self.fetch_accepted(user_id),
            )
            .await
    }

    /// 别人发给当前用户、尚未处理的好友请求
    pub async fn pending_requests(&self) -> QueryResult<Vec<Friendship>> {
        let Some(me) = self.ctx.auth.user_id() else {
            return QueryResult::idle();
        };
        let request = SelectRequest::new(FRIENDSHIPS_TABLE)
            .filter(Filter::eq("friend_user_id", me.as_str()))
            .filter(Filter::eq("status", FriendshipStatus::Pending.as_str()))
            .order("created_at", false);
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Friendship).part("pending").part(&me)),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载好友请求失败")?;
                    decode_rows::<Friendship>(rows, "好友关系")
                },
            )
            .await
    }

    /// 两个用户的共同好友；参数顺序不影响结果与缓存
    pub async fn shared_friends(&self, a: &str, b: &str) -> QueryResult<BTreeSet<String>> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.ctx
            .query
            .fetch(
                QueryOptions::new(
                    QueryKey::new(EntityTag::Friendship)
                        .part("shared")
                        .part(first)
                        .part(second),
                )
                .enabled(!a.is_empty() && !b.is_empty() && a != b),
                || async {
                    let (first_friends, second_friends) = futures_util::try_join!(
                        self.fetch_accepted(first),
                        self.fetch_accepted(second)
                    )?;
                    let shared =
                        shared_friend_ids(first, &first_friends, second, &second_friends);
                    debug!(
                        "[FriendSvc] {} 与 {} 的共同好友数: {}",
                        first,
                        second,
                        shared.len()
                    );
                    Ok::<_, anyhow::Error>(shared)
                },
            )
            .await
    }

    pub async fn shared_friend_count(&self, a: &str, b: &str) -> QueryResult<usize> {
        self.shared_friends(a, b).await.map(|shared| shared.len())
    }

    /// 向目标用户发送好友请求
    pub async fn send_request(&self, target: &str) -> Result<Friendship> {
        let me = self.ctx.require_user_id()?;
        if target.is_empty() || target == me {
            return Err(SdkError::InvalidInput("invalid friend request target".into()).into());
        }
        info!("[FriendSvc] 🤝 {} -> {} 发送好友请求", me, target);

        self.ctx
            .query
            .mutate(
                MutationOptions::new("发送好友请求", &[EntityTag::Friendship])
                    .success("好友请求已发送")
                    .error("发送好友请求失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .insert(
                            FRIENDSHIPS_TABLE,
                            json!({
                                "user_id": me,
                                "friend_user_id": target,
                                "status": FriendshipStatus::Pending,
                            }),
                        )
                        .await
                        .context("发送好友请求失败")?;
                    decode_first::<Friendship>(rows, "好友关系")?
                        .ok_or_else(|| anyhow::anyhow!("发送好友请求后未返回数据"))
                },
            )
            .await
    }

    /// 接受 `from` 发来的请求，并把反方向的行置为 accepted（没有则写入）
    pub async fn accept_request(&self, from: &str) -> Result<Friendship> {
        let me = self.ctx.require_user_id()?;

        self.ctx
            .query
            .mutate(
                MutationOptions::new("接受好友请求", &[EntityTag::Friendship])
                    .success("已添加好友")
                    .error("接受好友请求失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .update(
                            FRIENDSHIPS_TABLE,
                            &[
                                Filter::eq("user_id", from),
                                Filter::eq("friend_user_id", me.as_str()),
                                Filter::eq("status", FriendshipStatus::Pending.as_str()),
                            ],
                            json!({ "status": FriendshipStatus::Accepted }),
                        )
                        .await
                        .context("更新好友请求失败")?;
                    let accepted = decode_first::<Friendship>(rows, "好友关系")?.ok_or_else(|| {
                        anyhow::Error::from(SdkError::NotFound {
                            entity: "friend request",
                            id: from.to_string(),
                        })
                    })?;

                    // 双方互发过请求时反方向已有 pending 行
                    let reverse = self
                        .ctx
                        .backend
                        .update(
                            FRIENDSHIPS_TABLE,
                            &[
                                Filter::eq("user_id", me.as_str()),
                                Filter::eq("friend_user_id", from),
                            ],
                            json!({ "status": FriendshipStatus::Accepted }),
                        )
                        .await
                        .context("更新反向好友关系失败")?;
                    if reverse.is_empty() {
                        self.ctx
                            .backend
                            .insert(
                                FRIENDSHIPS_TABLE,
                                json!({
                                    "user_id": me,
                                    "friend_user_id": from,
                                    "status": FriendshipStatus::Accepted,
                                }),
                            )
                            .await
                            .context("写入反向好友关系失败")?;
                    } else {
                        debug!("[FriendSvc] 反向请求已存在，直接置为 accepted: {} -> {}", me, from);
                    }
                    Ok(accepted)
                },
            )
            .await
    }

    /// 删除双方向的关系行
    pub async fn remove_friend(&self, other: &str) -> Result<()> {
        let me = self.ctx.require_user_id()?;

        self.ctx
            .query
            .mutate(
                MutationOptions::new("删除好友", &[EntityTag::Friendship])
                    .success("已删除好友")
                    .error("删除好友失败"),
                || async {
                    let outgoing = [
                        Filter::eq("user_id", me.as_str()),
                        Filter::eq("friend_user_id", other),
                    ];
                    let incoming = [
                        Filter::eq("user_id", other),
                        Filter::eq("friend_user_id", me.as_str()),
                    ];
                    futures_util::try_join!(
                        self.ctx.backend.delete(FRIENDSHIPS_TABLE, &outgoing),
                        self.ctx.backend.delete(FRIENDSHIPS_TABLE, &incoming)
                    )
                    .context("删除好友关系失败")?;
                    Ok(())
                },
            )
            .await
    }
}
