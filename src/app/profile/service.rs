//! 用户资料服务

use crate::app::backend::{Filter, SelectRequest};
use crate::app::cache::{EntityTag, MutationOptions, QueryKey, QueryOptions, QueryResult};
use crate::app::client::AppContext;
use crate::app::error::SdkError;
use crate::app::profile::models::{Profile, ProfileUpdate};
use crate::app::types::{decode_first, decode_rows};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) const PROFILES_TABLE: &str = "profiles";
const SEARCH_LIMIT: usize = 20;
const MIN_SEARCH_LEN: usize = 2;

/// 用户资料服务
pub struct ProfileService {
    ctx: Arc<AppContext>,
}

impl ProfileService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 获取指定用户资料，用户不存在时 data 为 `Some(None)`
    pub async fn get_profile(&self, user_id: &str) -> QueryResult<Option<Profile>> {
        let request = SelectRequest::new(PROFILES_TABLE)
            .filter(Filter::eq("id", user_id))
            .limit(1);
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::Profile).part(user_id))
                    .enabled(!user_id.is_empty()),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载用户资料失败")?;
                    decode_first::<Profile>(rows, "用户资料")
                },
            )
            .await
    }

    /// 当前登录用户的资料；未登录时查询不启用
    pub async fn get_current_profile(&self) -> QueryResult<Option<Profile>> {
        match self.ctx.auth.user_id() {
            Some(id) => self.get_profile(&id).await,
            None => {
                debug!("[ProfileSvc] 未登录，跳过加载当前用户资料");
                QueryResult::idle()
            }
        }
    }

    /// 按用户名或昵称搜索用户（排除自己）
    pub async fn search_profiles(&self, term: &str) -> QueryResult<Vec<Profile>> {
        let term = term.trim().to_string();
        let me = self.ctx.auth.user_id();
        let pattern = format!("*{}*", term.replace(['*', ',', '(', ')'], ""));

        let mut request = SelectRequest::new(PROFILES_TABLE)
            .filter(Filter::Or(vec![
                Filter::ILike("username".to_string(), pattern.clone()),
                Filter::ILike("name".to_string(), pattern),
            ]))
            .order("username", true)
            .limit(SEARCH_LIMIT);
        if let Some(me) = &me {
            request = request.filter(Filter::neq("id", me.as_str()));
        }

        self.ctx
            .query
            .fetch(
                QueryOptions::new(
                    QueryKey::new(EntityTag::Profile)
                        .part("search")
                        .part(me.as_deref().unwrap_or_default())
                        .part(term.to_lowercase()),
                )
                .enabled(term.chars().count() >= MIN_SEARCH_LEN),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("搜索用户失败")?;
                    decode_rows::<Profile>(rows, "用户资料")
                },
            )
            .await
    }

    /// 更新当前用户资料
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let me = self.ctx.require_user_id()?;
        if update.is_empty() {
            return Err(SdkError::InvalidInput("profile update is empty".into()).into());
        }
        if let Some(username) = &update.username {
            if username.trim().is_empty() {
                return Err(SdkError::InvalidInput("username is empty".into()).into());
            }
        }

        let patch = serde_json::to_value(&update).context("序列化资料更新失败")?;
        info!("[ProfileSvc] ✏️ 更新资料: {}", me);

        self.ctx
            .query
            .mutate(
                MutationOptions::new("更新资料", &[EntityTag::Profile, EntityTag::NearbyUser])
                    .success("资料已更新")
                    .error("资料更新失败"),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .update(PROFILES_TABLE, &[Filter::eq("id", me.as_str())], patch)
                        .await
                        .context("更新资料请求失败")?;
                    decode_first::<Profile>(rows, "用户资料")?.ok_or_else(|| {
                        anyhow::Error::from(SdkError::NotFound {
                            entity: "profile",
                            id: me.clone(),
                        })
                    })
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::app::client::test_support::*;
    use crate::app::context::SessionUser;
    use crate::app::error::{is_sdk_error, SdkError};
    use crate::app::profile::ProfileUpdate;
    use crate::app::testing::Call;
    use serde_json::json;

    #[tokio::test]
    async fn get_profile_caches_by_user_id() {
        let (client, backend, _) = signed_in_client("u1");
        backend.respond("select:profiles", json!([{ "id": "u2", "name": "Mia" }]));

        let first = client.profiles().get_profile("u2").await;
        assert_eq!(first.data.unwrap().unwrap().name.as_deref(), Some("Mia"));
        let second = client.profiles().get_profile("u2").await;
        assert!(second.is_success());
        assert_eq!(backend.call_count("select:profiles"), 1);
    }

    #[tokio::test]
    async fn missing_profile_is_not_an_error() {
        let (client, backend, _) = signed_in_client("u1");
        backend.respond("select:profiles", json!([]));
        let result = client.profiles().get_profile("ghost").await;
        assert!(result.error.is_none());
        assert_eq!(result.data, Some(None));
    }

    #[tokio::test]
    async fn current_profile_requires_sign_in() {
        let (client, backend) = anonymous_client();
        let result = client.profiles().get_current_profile().await;
        assert!(result.data.is_none());
        assert_eq!(backend.calls().len(), 0);
    }

    #[tokio::test]
    async fn short_search_terms_do_not_query() {
        let (client, backend, _) = signed_in_client("u1");
        let result = client.profiles().search_profiles(" a ").await;
        assert!(result.data.is_none());
        assert_eq!(backend.call_count("select:profiles"), 0);

        backend.respond("select:profiles", json!([{ "id": "u3", "username": "anna" }]));
        let result = client.profiles().search_profiles("an").await;
        assert_eq!(result.data.unwrap().len(), 1);
        let calls = backend.calls_to("select:profiles");
        let Call::Select(req) = &calls[0] else {
            panic!("expected select");
        };
        assert!(req
            .query_pairs()
            .contains(&("id".to_string(), "neq.u1".to_string())));
    }

    #[tokio::test]
    async fn search_results_are_not_shared_between_users() {
        let (client, backend, _) = signed_in_client("u1");
        backend.respond("select:profiles", json!([{ "id": "u2", "username": "lin" }]));
        backend.respond("select:profiles", json!([{ "id": "u1", "username": "lina" }]));

        let first = client.profiles().search_profiles("lin").await;
        assert_eq!(first.data.unwrap()[0].id, "u2");

        client.sign_in(SessionUser {
            id: "u2".to_string(),
            email: None,
            access_token: "token-u2".to_string(),
        });
        let second = client.profiles().search_profiles("lin").await;
        assert_eq!(second.data.unwrap()[0].id, "u1");
        assert_eq!(backend.call_count("select:profiles"), 2);
        let calls = backend.calls_to("select:profiles");
        let Call::Select(req) = &calls[1] else {
            panic!("expected select");
        };
        assert!(req
            .query_pairs()
            .contains(&("id".to_string(), "neq.u2".to_string())));
    }

    #[tokio::test]
    async fn update_profile_invalidates_cached_profile() {
        let (client, backend, feedback) = signed_in_client("u1");
        backend.respond("select:profiles", json!([{ "id": "u1", "mood": "😴" }]));
        client.profiles().get_profile("u1").await;

        backend.respond("update:profiles", json!([{ "id": "u1", "mood": "🎉" }]));
        let updated = client
            .profiles()
            .update_profile(ProfileUpdate {
                mood: Some("🎉".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.mood.as_deref(), Some("🎉"));
        assert_eq!(feedback.successes(), vec!["资料已更新".to_string()]);

        client.profiles().get_profile("u1").await;
        assert_eq!(backend.call_count("select:profiles"), 2);
    }

    #[tokio::test]
    async fn empty_update_is_rejected_locally() {
        let (client, backend, _) = signed_in_client("u1");
        let err = client
            .profiles()
            .update_profile(ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SdkError>(),
            Some(SdkError::InvalidInput(_))
        ));
        assert_eq!(backend.calls().len(), 0);
    }

    #[tokio::test]
    async fn update_without_session_fails() {
        let (client, _) = anonymous_client();
        let err = client
            .profiles()
            .update_profile(ProfileUpdate {
                bio: Some("hi".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(is_sdk_error(&err, &SdkError::NotSignedIn));
    }
}
