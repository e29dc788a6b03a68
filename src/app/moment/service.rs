//! 动态服务：列表查询、增删改、邀请与详情聚合

use crate::app::backend::{Filter, SelectRequest};
use crate::app::cache::{EntityTag, MutationOptions, QueryKey, QueryOptions, QueryResult};
use crate::app::client::AppContext;
use crate::app::error::SdkError;
use crate::app::moment::models::{
    InviteStatus, Moment, MomentDetail, MomentInvite, MomentUpdate, NewMoment,
};
use crate::app::profile::service::PROFILES_TABLE;
use crate::app::profile::Profile;
use crate::app::types::{decode_first, decode_rows};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MOMENTS_TABLE: &str = "moments";
const INVITES_TABLE: &str = "moment_invites";
const LIST_LIMIT: usize = 100;

/// 动态服务
pub struct MomentService {
    ctx: Arc<AppContext>,
}

impl MomentService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 按展示规则与当前筛选条件过滤列表
    fn visible(&self, mut result: QueryResult<Vec<Moment>>) -> QueryResult<Vec<Moment>> {
        let now = Utc::now();
        let filters = self.ctx.filters.get();
        if let Some(moments) = result.data.take() {
            result.data = Some(
                moments
                    .into_iter()
                    .filter(|m| m.is_displayable_at(now) && filters.matches(m))
                    .collect(),
            );
        }
        result
    }

    /// 所有未删除、未结束的动态，按开始时间排序
    pub async fn active_moments(&self) -> QueryResult<Vec<Moment>> {
        let request = SelectRequest::new(MOMENTS_TABLE)
            .filter(Filter::is_null("deleted_at"))
            .order("when_at", true)
            .limit(LIST_LIMIT);
        let result = self
            .ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Moment).part("active")),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载动态列表失败")?;
                    decode_rows::<Moment>(rows, "动态")
                },
            )
            .await;
        self.visible(result)
    }

    /// 当前用户创建或参与的动态
    pub async fn my_moments(&self) -> QueryResult<Vec<Moment>> {
        let Some(me) = self.ctx.auth.user_id() else {
            debug!("[MomentSvc] 未登录，跳过加载我的动态");
            return QueryResult::idle();
        };
        let request = SelectRequest::new(MOMENTS_TABLE)
            .filter(Filter::is_null("deleted_at"))
            .filter(Filter::Or(vec![
                Filter::eq("creator_id", me.as_str()),
                Filter::contains("participants", [me.as_str()]),
            ]))
            .order("when_at", true)
            .limit(LIST_LIMIT);
        let result = self
            .ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Moment).part("mine").part(&me)),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载我的动态失败")?;
                    decode_rows::<Moment>(rows, "动态")
                },
            )
            .await;
        self.visible(result)
    }

    async fn fetch_moment_row(&self, id: &str) -> Result<Option<Moment>> {
        let request = SelectRequest::new(MOMENTS_TABLE)
            .filter(Filter::eq("id", id))
            .filter(Filter::is_null("deleted_at"))
            .limit(1);
        let rows = self
            .ctx
            .backend
            .select(&request)
            .await
            .context("加载动态失败")?;
        decode_first::<Moment>(rows, "动态")
    }

    async fn fetch_invite_rows(&self, moment_id: &str) -> Result<Vec<MomentInvite>> {
        let request = SelectRequest::new(INVITES_TABLE)
            .filter(Filter::eq("moment_id", moment_id))
            .order("created_at", false);
        let rows = self
            .ctx
            .backend
            .select(&request)
            .await
            .context("加载邀请列表失败")?;
        decode_rows::<MomentInvite>(rows, "邀请")
    }

    async fn fetch_profiles(&self, ids: &[String]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = SelectRequest::new(PROFILES_TABLE)
            .filter(Filter::in_list("id", ids.iter().map(String::as_str)));
        let rows = self
            .ctx
            .backend
            .select(&request)
            .await
            .context("加载参与者资料失败")?;
        decode_rows::<Profile>(rows, "用户资料")
    }

    /// 单条动态（已软删除的视为不存在）
    pub async fn get_moment(&self, id: &str) -> QueryResult<Option<Moment>> {
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Moment).part("id").part(id))
                    .enabled(!id.is_empty()),
                || self.fetch_moment_row(id),
            )
            .await
    }

    /// 动态详情：动态与邀请并行加载，任一失败则整体失败
    pub async fn moment_detail(&self, id: &str) -> QueryResult<MomentDetail> {
        self.ctx
            .query
            .fetch(
                QueryOptions::new(
                    QueryKey::new(EntityTag::Moment)
                        .part("detail")
                        .part(id)
                        .also(EntityTag::Invite)
                        .also(EntityTag::Profile),
                )
                .enabled(!id.is_empty()),
                || async {
                    let (moment, invites) = futures_util::try_join!(
                        self.fetch_moment_row(id),
                        self.fetch_invite_rows(id)
                    )?;
                    let moment = moment.ok_or_else(|| {
                        anyhow::Error::from(SdkError::NotFound {
                            entity: "moment",
                            id: id.to_string(),
                        })
                    })?;

                    let mut ids = vec![moment.creator_id.clone()];
                    for p in &moment.participants {
                        if !ids.contains(p) {
                            ids.push(p.clone());
                        }
                    }
                    let participants = self.fetch_profiles(&ids).await?;

                    Ok::<_, anyhow::Error>(MomentDetail {
                        moment,
                        participants,
                        invites,
                    })
                },
            )
            .await
    }

    /// 创建动态，创建者自动成为参与者
    pub async fn create_moment(&self, new_moment: NewMoment) -> Result<Moment> {
        let me = self.ctx.require_user_id()?;
        if new_moment.title.trim().is_empty() {
            return Err(SdkError::InvalidInput("title is empty".into()).into());
        }
        if let (Some(start), Some(end)) = (new_moment.when_at, new_moment.end_at) {
            if end <= start {
                return Err(SdkError::InvalidInput("end_at must be after when_at".into()).into());
            }
        }

        let mut row = serde_json::to_value(&new_moment).context("序列化动态失败")?;
        if let Value::Object(map) = &mut row {
            map.insert("creator_id".to_string(), json!(me));
            map.insert("participants".to_string(), json!([me]));
        }

        info!("[MomentSvc] ➕ 创建动态: {}", new_moment.title);
        self.ctx
            .query
            .mutate(
                MutationOptions::new("创建动态", &[EntityTag::Moment])
                    .success("动态已发布")
                    .error("发布动态失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .insert(MOMENTS_TABLE, row)
                        .await
                        .context("创建动态请求失败")?;
                    decode_first::<Moment>(rows, "动态")?
                        .ok_or_else(|| anyhow::anyhow!("创建动态后未返回数据"))
                },
            )
            .await
    }

    /// 修改自己创建的动态
    pub async fn update_moment(&self, id: &str, update: MomentUpdate) -> Result<Moment> {
        let me = self.ctx.require_user_id()?;
        if update.is_empty() {
            return Err(SdkError::InvalidInput("moment update is empty".into()).into());
        }
        if matches!(&update.title, Some(t) if t.trim().is_empty()) {
            return Err(SdkError::InvalidInput("title is empty".into()).into());
        }
        let patch = serde_json::to_value(&update).context("序列化动态更新失败")?;

        self.ctx
            .query
            .mutate(
                MutationOptions::new("修改动态", &[EntityTag::Moment])
                    .success("动态已更新")
                    .error("修改动态失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .update(
                            MOMENTS_TABLE,
                            &[
                                Filter::eq("id", id),
                                Filter::eq("creator_id", me.as_str()),
                                Filter::is_null("deleted_at"),
                            ],
                            patch,
                        )
                        .await
                        .context("修改动态请求失败")?;
                    decode_first::<Moment>(rows, "动态")?.ok_or_else(|| {
                        anyhow::Error::from(SdkError::NotFound {
                            entity: "moment",
                            id: id.to_string(),
                        })
                    })
                },
            )
            .await
    }

    /// 软删除动态，返回删除时间
    ///
    /// 重复删除返回第一次删除的时间；动态不存在时返回 `SdkError::NotFound`。
    pub async fn soft_delete_moment(&self, id: &str) -> Result<DateTime<Utc>> {
        let me = self.ctx.require_user_id()?;

        #[derive(Deserialize)]
        struct DeletionState {
            creator_id: String,
            #[serde(default)]
            deleted_at: Option<DateTime<Utc>>,
        }

        self.ctx
            .query
            .mutate(
                MutationOptions::new("删除动态", &[EntityTag::Moment, EntityTag::Invite])
                    .success("动态已删除")
                    .error("删除动态失败"),
                || async {
                    let now = Utc::now();
                    let rows = self
                        .ctx
                        .backend
                        .update(
                            MOMENTS_TABLE,
                            &[
                                Filter::eq("id", id),
                                Filter::eq("creator_id", me.as_str()),
                                Filter::is_null("deleted_at"),
                            ],
                            json!({ "deleted_at": now }),
                        )
                        .await
                        .context("删除动态请求失败")?;
                    if let Some(moment) = decode_first::<Moment>(rows, "动态")? {
                        return Ok(moment.deleted_at.unwrap_or(now));
                    }

                    // 没有行被更新：区分已删除、无权限与不存在
                    let existing = self
                        .ctx
                        .backend
                        .select(
                            &SelectRequest::new(MOMENTS_TABLE)
                                .columns("creator_id,deleted_at")
                                .filter(Filter::eq("id", id))
                                .limit(1),
                        )
                        .await
                        .context("查询动态删除状态失败")?;
                    match decode_first::<DeletionState>(existing, "动态删除状态")? {
                        Some(DeletionState {
                            deleted_at: Some(at),
                            ..
                        }) => {
                            debug!("[MomentSvc] 动态 {} 已于 {} 删除", id, at);
                            Ok(at)
                        }
                        Some(state) => {
                            warn!(
                                "[MomentSvc] 用户 {} 无权删除动态 {}（创建者 {}）",
                                me, id, state.creator_id
                            );
                            Err(anyhow::anyhow!("只有创建者可以删除动态"))
                        }
                        None => Err(SdkError::NotFound {
                            entity: "moment",
                            id: id.to_string(),
                        }
                        .into()),
                    }
                },
            )
            .await
    }

    /// 某条动态的邀请列表
    pub async fn invites_for_moment(&self, moment_id: &str) -> QueryResult<Vec<MomentInvite>> {
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Invite).part("moment").part(moment_id))
                    .enabled(!moment_id.is_empty()),
                || self.fetch_invite_rows(moment_id),
            )
            .await
    }

    /// 当前用户收到的待处理邀请
    pub async fn my_invites(&self) -> QueryResult<Vec<MomentInvite>> {
        let Some(me) = self.ctx.auth.user_id() else {
            return QueryResult::idle();
        };
        let request = SelectRequest::new(INVITES_TABLE)
            .filter(Filter::eq("invitee_id", me.as_str()))
            .filter(Filter::eq("status", InviteStatus::Pending.as_str()))
            .order("created_at", false);
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Invite).part("mine").part(&me)),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载我的邀请失败")?;
                    decode_rows::<MomentInvite>(rows, "邀请")
                },
            )
            .await
    }

    /// 邀请用户参加动态
    pub async fn send_invite(&self, moment_id: &str, invitee_id: &str) -> Result<MomentInvite> {
        let me = self.ctx.require_user_id()?;
        if invitee_id.is_empty() || invitee_id == me {
            return Err(SdkError::InvalidInput("invalid invitee".into()).into());
        }
        let row = json!({
            "moment_id": moment_id,
            "inviter_id": me,
            "invitee_id": invitee_id,
            "status": InviteStatus::Pending,
        });

        self.ctx
            .query
            .mutate(
                MutationOptions::new("发送邀请", &[EntityTag::Invite])
                    .success("邀请已发送")
                    .error("发送邀请失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .insert(INVITES_TABLE, row)
                        .await
                        .context("发送邀请请求失败")?;
                    decode_first::<MomentInvite>(rows, "邀请")?
                        .ok_or_else(|| anyhow::anyhow!("发送邀请后未返回数据"))
                },
            )
            .await
    }

    /// 接受或拒绝邀请；接受后通过 RPC 加入动态参与者
    pub async fn respond_to_invite(&self, invite_id: &str, accept: bool) -> Result<MomentInvite> {
        let me = self.ctx.require_user_id()?;
        let status = if accept {
            InviteStatus::Accepted
        } else {
            InviteStatus::Declined
        };

        self.ctx
            .query
            .mutate(
                MutationOptions::new("处理邀请", &[EntityTag::Invite, EntityTag::Moment])
                    .success(if accept { "已接受邀请" } else { "已拒绝邀请" })
                    .error("处理邀请失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .update(
                            INVITES_TABLE,
                            &[
                                Filter::eq("id", invite_id),
                                Filter::eq("invitee_id", me.as_str()),
                                Filter::eq("status", InviteStatus::Pending.as_str()),
                            ],
                            json!({ "status": status }),
                        )
                        .await
                        .context("处理邀请请求失败")?;
                    let invite = decode_first::<MomentInvite>(rows, "邀请")?.ok_or_else(|| {
                        anyhow::Error::from(SdkError::NotFound {
                            entity: "invite",
                            id: invite_id.to_string(),
                        })
                    })?;

                    if accept {
                        self.ctx
                            .backend
                            .rpc("join_moment", json!({ "p_moment_id": invite.moment_id }))
                            .await
                            .context("加入动态失败")?;
                    }
                    Ok(invite)
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::app::client::test_support::*;
    use crate::app::error::{is_sdk_error, SdkError};
    use crate::app::moment::{InviteStatus, MomentUpdate, NewMoment};
    use crate::app::testing::Call;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn moment_row(id: &str, when_offset_min: i64, end_offset_min: Option<i64>) -> serde_json::Value {
        let now = Utc::now();
        json!({
            "id": id,
            "creator_id": "u1",
            "title": format!("moment {}", id),
            "participants": ["u1"],
            "when_at": now + Duration::minutes(when_offset_min),
            "end_at": end_offset_min.map(|m| now + Duration::minutes(m)),
        })
    }

    #[tokio::test]
    async fn active_moments_filter_soft_deleted_and_ended() {
        let (client, backend, _) = signed_in_client("u1");
        backend.respond(
            "select:moments",
            json!([
                moment_row("live", -30, Some(120)),
                moment_row("ended", -180, Some(-60)),
                moment_row("later", 600, None),
            ]),
        );

        let result = client.moments().active_moments().await;
        let ids: Vec<String> = result.data.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["live".to_string(), "later".to_string()]);

        let calls = backend.calls_to("select:moments");
        let Call::Select(req) = &calls[0] else {
            panic!("expected select");
        };
        assert!(req
            .query_pairs()
            .contains(&("deleted_at".to_string(), "is.null".to_string())));
    }

    #[tokio::test]
    async fn active_moments_apply_category_filter() {
        let (client, backend, _) = signed_in_client("u1");
        let mut sport = moment_row("sport", 60, None);
        sport["category"] = json!("sport");
        let mut music = moment_row("music", 60, None);
        music["category"] = json!("music");
        backend.respond("select:moments", json!([sport, music]));

        client.filters().toggle_category("music");
        let result = client.moments().active_moments().await;
        let ids: Vec<String> = result.data.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["music".to_string()]);
    }

    #[tokio::test]
    async fn create_moment_validates_and_invalidates_lists() {
        let (client, backend, feedback) = signed_in_client("u1");
        backend.respond("select:moments", json!([]));
        client.moments().active_moments().await;

        let err = client
            .moments()
            .create_moment(NewMoment {
                title: "  ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SdkError>(),
            Some(SdkError::InvalidInput(_))
        ));

        backend.respond("insert:moments", json!([moment_row("new", 60, None)]));
        let created = client
            .moments()
            .create_moment(NewMoment {
                title: "Picnic".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.id, "new");
        assert_eq!(feedback.successes(), vec!["动态已发布".to_string()]);

        let inserts = backend.calls_to("insert:moments");
        let Call::Insert { rows, .. } = &inserts[0] else {
            panic!("expected insert");
        };
        assert_eq!(rows["creator_id"], json!("u1"));
        assert_eq!(rows["participants"], json!(["u1"]));

        client.moments().active_moments().await;
        assert_eq!(backend.call_count("select:moments"), 2);
    }

    #[tokio::test]
    async fn soft_delete_twice_is_idempotent() {
        let (client, backend, _) = signed_in_client("u1");
        let deleted_at = Utc::now() - Duration::minutes(5);
        let mut deleted = moment_row("m1", 60, None);
        deleted["deleted_at"] = json!(deleted_at);

        backend.respond("update:moments", json!([deleted.clone()]));
        backend.respond("update:moments", json!([]));
        backend.respond(
            "select:moments",
            json!([{ "creator_id": "u1", "deleted_at": deleted_at }]),
        );

        let first = client.moments().soft_delete_moment("m1").await.unwrap();
        let second = client.moments().soft_delete_moment("m1").await.unwrap();
        assert_eq!(first, deleted_at);
        assert_eq!(second, deleted_at);

        let updates = backend.calls_to("update:moments");
        let Call::Update { filters, patch, .. } = &updates[1] else {
            panic!("expected update");
        };
        assert!(filters.contains(&crate::app::backend::Filter::is_null("deleted_at")));
        assert!(patch.get("deleted_at").is_some());
    }

    #[tokio::test]
    async fn soft_delete_of_missing_row_is_not_found() {
        let (client, backend, feedback) = signed_in_client("u1");
        backend.respond("update:moments", json!([]));
        backend.respond("select:moments", json!([]));

        let err = client.moments().soft_delete_moment("gone").await.unwrap_err();
        assert!(is_sdk_error(
            &err,
            &SdkError::NotFound {
                entity: "moment",
                id: "gone".to_string()
            }
        ));
        assert_eq!(feedback.errors().len(), 1);
    }

    #[tokio::test]
    async fn soft_delete_of_someone_elses_moment_fails() {
        let (client, backend, _) = signed_in_client("u2");
        backend.respond("update:moments", json!([]));
        backend.respond("select:moments", json!([{ "creator_id": "u1", "deleted_at": null }]));
        assert!(client.moments().soft_delete_moment("m1").await.is_err());
    }

    #[tokio::test]
    async fn moment_detail_joins_moment_invites_and_profiles() {
        let (client, backend, _) = signed_in_client("u1");
        let mut row = moment_row("m1", 60, None);
        row["participants"] = json!(["u1", "u2"]);
        backend.respond("select:moments", json!([row]));
        backend.respond(
            "select:moment_invites",
            json!([{ "id": "i1", "moment_id": "m1", "inviter_id": "u1", "invitee_id": "u3", "status": "pending" }]),
        );
        backend.respond("select:profiles", json!([{ "id": "u1" }, { "id": "u2" }]));

        let detail = client.moments().moment_detail("m1").await.data.unwrap();
        assert_eq!(detail.participants.len(), 2);
        assert_eq!(detail.pending_invites().count(), 1);

        let calls = backend.calls_to("select:profiles");
        let Call::Select(req) = &calls[0] else {
            panic!("expected select");
        };
        assert!(req
            .query_pairs()
            .contains(&("id".to_string(), "in.(u1,u2)".to_string())));
    }

    #[tokio::test]
    async fn moment_detail_aborts_when_any_part_fails() {
        let (client, backend, _) = signed_in_client("u1");
        backend.respond("select:moments", json!([moment_row("m1", 60, None)]));
        backend.fail("select:moment_invites", "invites unavailable");

        let result = client.moments().moment_detail("m1").await;
        assert!(result.data.is_none());
        let err = result.error.unwrap();
        assert!(format!("{:#}", err).contains("invites unavailable"));
        assert_eq!(backend.call_count("select:profiles"), 0);
    }

    #[tokio::test]
    async fn accepting_invite_joins_the_moment() {
        let (client, backend, _) = signed_in_client("u3");
        backend.respond(
            "update:moment_invites",
            json!([{ "id": "i1", "moment_id": "m1", "inviter_id": "u1", "invitee_id": "u3", "status": "accepted" }]),
        );
        let invite = client.moments().respond_to_invite("i1", true).await.unwrap();
        assert_eq!(invite.status, InviteStatus::Accepted);
        let rpcs = backend.calls_to("rpc:join_moment");
        assert_eq!(
            rpcs,
            vec![Call::Rpc {
                name: "join_moment".to_string(),
                args: json!({ "p_moment_id": "m1" })
            }]
        );
    }

    #[tokio::test]
    async fn responding_to_unknown_invite_is_not_found() {
        let (client, backend, _) = signed_in_client("u3");
        backend.respond("update:moment_invites", json!([]));
        let err = client.moments().respond_to_invite("i9", false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SdkError>(),
            Some(SdkError::NotFound { .. })
        ));
        assert_eq!(backend.call_count("rpc:join_moment"), 0);
    }

    #[tokio::test]
    async fn cannot_invite_yourself_or_send_empty_update() {
        let (client, backend, _) = signed_in_client("u1");
        assert!(client.moments().send_invite("m1", "u1").await.is_err());
        assert!(client
            .moments()
            .update_moment("m1", MomentUpdate::default())
            .await
            .is_err());
        assert!(backend.calls().is_empty());
    }
}
