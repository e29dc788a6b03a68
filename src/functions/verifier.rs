//! 调用者凭证校验

use crate::app::backend::AuthApi;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// 返回凭证对应的用户 ID，凭证无效时为 `None`
    async fn verify(&self, access_token: &str) -> Result<Option<String>>;
}

/// 通过认证服务 `/auth/v1/user` 校验
pub struct RemoteTokenVerifier {
    auth: AuthApi,
}

impl RemoteTokenVerifier {
    pub fn new(api_base_url: String, anon_key: String) -> Self {
        Self {
            auth: AuthApi::new(reqwest::Client::new(), api_base_url, anon_key),
        }
    }
}

#[async_trait]
impl TokenVerifier for RemoteTokenVerifier {
    async fn verify(&self, access_token: &str) -> Result<Option<String>> {
        Ok(self.auth.get_user(access_token).await?.map(|user| user.id))
    }
}
