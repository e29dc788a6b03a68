//! 认证服务的最小封装：凭证校验与确认邮件重发

use crate::app::types::handle_http_response;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 认证服务返回的用户
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// 认证 HTTP API 客户端
#[derive(Clone)]
pub struct AuthApi {
    client: reqwest::Client,
    api_base_url: String,
    anon_key: String,
}

impl AuthApi {
    pub fn new(client: reqwest::Client, api_base_url: String, anon_key: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }

    /// 用 access token 换取用户信息；凭证无效时返回 `None`
    pub async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let url = format!("{}/auth/v1/user", self.api_base_url);
        debug!("[AuthAPI] 校验用户凭证: {}", url);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .context("请求失败")?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            warn!("[AuthAPI] 凭证无效，HTTP状态: {}", status);
            return Ok(None);
        }

        let user: AuthUser = handle_http_response(response, "获取用户").await?;
        Ok(Some(user))
    }

    /// 重新发送注册确认邮件
    pub async fn resend_confirmation(&self, email: &str) -> Result<()> {
        let url = format!("{}/auth/v1/resend", self.api_base_url);
        info!("[AuthAPI] 📧 重发确认邮件");

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "type": "signup",
                "email": email,
            }))
            .send()
            .await
            .context("请求失败")?;

        let _: serde_json::Value = handle_http_response(response, "重发确认邮件").await?;
        Ok(())
    }
}
