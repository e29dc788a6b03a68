//! Moments 客户端根对象
//!
//! 持有后端连接、查询缓存与共享状态，各业务服务从这里获取。

use crate::app::ai_chat::AiChatService;
use crate::app::backend::{AuthApi, Backend, RestBackend};
use crate::app::cache::{QueryClient, DEFAULT_STALE_TIME};
use crate::app::city_group::CityGroupService;
use crate::app::contacts::ContactsService;
use crate::app::context::{AuthContext, FilterContext, SessionUser};
use crate::app::feedback::FeedbackListener;
use crate::app::friend::FriendService;
use crate::app::geocoding::GeocodingService;
use crate::app::moment::MomentService;
use crate::app::nearby::NearbyService;
use crate::app::notification::NotificationService;
use crate::app::profile::ProfileService;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 后端基础地址，例如 `https://xyz.example.co`
    pub api_base_url: String,
    /// 匿名 key（每个请求都会携带）
    pub anon_key: String,
    /// 已有的用户凭证
    pub access_token: Option<String>,
    /// 反向地理编码服务地址
    pub geocoding_base_url: String,
    /// 查询默认新鲜期
    pub default_stale_time: Duration,
    /// 单个 HTTP 请求超时
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: String, anon_key: String) -> Self {
        Self {
            api_base_url,
            anon_key,
            access_token: None,
            geocoding_base_url: "https://api.mapbox.com/geocoding/v5/mapbox.places".to_string(),
            default_stale_time: DEFAULT_STALE_TIME,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// 从环境变量（以及 `.env` 文件）读取配置
    ///
    /// - `MOMENTS_API_URL`、`MOMENTS_ANON_KEY`：必填
    /// - `MOMENTS_ACCESS_TOKEN`、`MOMENTS_GEOCODING_URL`：可选
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_base_url =
            std::env::var("MOMENTS_API_URL").context("缺少环境变量 MOMENTS_API_URL")?;
        let anon_key =
            std::env::var("MOMENTS_ANON_KEY").context("缺少环境变量 MOMENTS_ANON_KEY")?;

        let mut config = Self::new(api_base_url, anon_key);
        config.access_token = std::env::var("MOMENTS_ACCESS_TOKEN").ok();
        if let Ok(url) = std::env::var("MOMENTS_GEOCODING_URL") {
            config.geocoding_base_url = url;
        }
        Ok(config)
    }
}

/// 各服务共享的运行时上下文
pub(crate) struct AppContext {
    pub(crate) config: ClientConfig,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) query: Arc<QueryClient>,
    pub(crate) auth: Arc<AuthContext>,
    pub(crate) filters: Arc<FilterContext>,
    pub(crate) http: reqwest::Client,
}

impl AppContext {
    /// 当前用户 ID，未登录返回 `SdkError::NotSignedIn`
    pub(crate) fn require_user_id(&self) -> Result<String> {
        Ok(self.auth.require_user()?.id)
    }
}

/// Moments 客户端
#[derive(Clone)]
pub struct MomentsClient {
    ctx: Arc<AppContext>,
    auth_api: AuthApi,
}

impl MomentsClient {
    /// 使用 REST 后端创建客户端
    pub fn new(config: ClientConfig) -> Result<Self> {
        let backend = Arc::new(RestBackend::new(&config)?);
        Self::with_backend(config, backend)
    }

    /// 使用自定义后端创建客户端
    pub fn with_backend(config: ClientConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout)
            .build()
            .context("创建 HTTP 客户端失败")?;
        let auth_api = AuthApi::new(
            http.clone(),
            config.api_base_url.clone(),
            config.anon_key.clone(),
        );
        let query = Arc::new(QueryClient::new(config.default_stale_time));

        info!("[Client] 🚀 创建客户端: {}", config.api_base_url);

        Ok(Self {
            ctx: Arc::new(AppContext {
                config,
                backend,
                query,
                auth: Arc::new(AuthContext::new()),
                filters: Arc::new(FilterContext::new()),
                http,
            }),
            auth_api,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }

    /// 注册写操作反馈监听器
    pub fn set_feedback_listener(&self, listener: Arc<dyn FeedbackListener>) {
        self.ctx.query.set_feedback_listener(listener);
    }

    /// 建立会话：后续请求使用用户凭证，切换用户时清空缓存
    pub fn sign_in(&self, user: SessionUser) {
        if self.ctx.auth.user_id().as_deref() != Some(user.id.as_str()) {
            self.ctx.query.clear();
        }
        self.ctx.backend.set_access_token(Some(user.access_token.clone()));
        self.ctx.auth.sign_in(user);
    }

    /// 用已有 access token 恢复会话
    pub async fn restore_session(&self, access_token: &str) -> Result<SessionUser> {
        let user = self
            .auth_api
            .get_user(access_token)
            .await?
            .ok_or_else(|| anyhow::anyhow!("凭证无效或已过期"))?;
        let session = SessionUser {
            id: user.id,
            email: user.email,
            access_token: access_token.to_string(),
        };
        self.sign_in(session.clone());
        Ok(session)
    }

    /// 结束会话并清空缓存
    pub fn sign_out(&self) {
        self.ctx.auth.sign_out();
        self.ctx.backend.set_access_token(None);
        self.ctx.query.clear();
    }

    pub async fn resend_confirmation(&self, email: &str) -> Result<()> {
        if email.trim().is_empty() {
            warn!("[Client] 重发确认邮件缺少邮箱");
            return Err(crate::app::error::SdkError::InvalidInput("email is empty".into()).into());
        }
        self.auth_api.resend_confirmation(email.trim()).await
    }

    pub fn auth(&self) -> &AuthContext {
        &self.ctx.auth
    }

    pub fn filters(&self) -> &FilterContext {
        &self.ctx.filters
    }

    pub fn query_client(&self) -> Arc<QueryClient> {
        self.ctx.query.clone()
    }

    pub fn profiles(&self) -> ProfileService {
        ProfileService::new(self.ctx.clone())
    }

    pub fn moments(&self) -> MomentService {
        MomentService::new(self.ctx.clone())
    }

    pub fn friends(&self) -> FriendService {
        FriendService::new(self.ctx.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.ctx.clone())
    }

    pub fn nearby(&self) -> NearbyService {
        NearbyService::new(self.ctx.clone())
    }

    pub fn city_groups(&self) -> CityGroupService {
        CityGroupService::new(self.ctx.clone())
    }

    pub fn ai_chat(&self) -> AiChatService {
        AiChatService::new(self.ctx.clone())
    }

    pub fn geocoding(&self) -> GeocodingService {
        GeocodingService::new(self.ctx.clone())
    }

    pub fn contacts(&self) -> ContactsService {
        ContactsService::new(self.ctx.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::app::cache::{EntityTag, QueryKey};
    use crate::app::context::SessionUser;

    #[test]
    fn sign_in_and_out_switch_backend_token_and_clear_cache() {
        let (client, backend, _) = signed_in_client("u1");
        client
            .query_client()
            .set_data(&QueryKey::new(EntityTag::Profile).part("u1"), 1u8);
        assert_eq!(client.auth().user_id().as_deref(), Some("u1"));

        client.sign_out();
        assert!(client.auth().current_user().is_none());
        assert!(client.query_client().is_empty());
        assert_eq!(
            backend.tokens(),
            vec![Some("token-u1".to_string()), None]
        );
    }

    #[test]
    fn switching_user_clears_cache() {
        let (client, _, _) = signed_in_client("u1");
        let key = QueryKey::new(EntityTag::Profile).part("u1");
        client.query_client().set_data(&key, 1u8);

        // 同一用户刷新凭证不清缓存
        client.sign_in(SessionUser {
            id: "u1".to_string(),
            email: None,
            access_token: "token-u1-refreshed".to_string(),
        });
        assert!(!client.query_client().is_empty());

        client.sign_in(SessionUser {
            id: "u2".to_string(),
            email: None,
            access_token: "token-u2".to_string(),
        });
        assert!(client.query_client().is_empty());
    }

    #[tokio::test]
    async fn resend_confirmation_rejects_blank_email() {
        let (client, _) = anonymous_client();
        assert!(client.resend_confirmation("  ").await.is_err());
    }
}
