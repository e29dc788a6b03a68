//! 应用级共享状态：当前用户与筛选条件
//!
//! 两者都由 [`crate::app::client::MomentsClient`] 在应用根创建并持有，
//! 订阅方通过 `tokio::sync::watch` 接收变更。

use crate::app::error::SdkError;
use crate::app::moment::Moment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::watch;
use tracing::info;

/// 已登录用户会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub access_token: String,
}

/// 当前用户容器
pub struct AuthContext {
    tx: watch::Sender<Option<SessionUser>>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.tx.borrow().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|u| u.id.clone())
    }

    /// 需要登录的操作使用，未登录返回 [`SdkError::NotSignedIn`]
    pub fn require_user(&self) -> anyhow::Result<SessionUser> {
        self.current_user()
            .ok_or_else(|| SdkError::NotSignedIn.into())
    }

    pub fn sign_in(&self, user: SessionUser) {
        info!("[AuthCtx] 👤 用户已登录: {}", user.id);
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.tx.send_replace(None) {
            info!("[AuthCtx] 👋 用户已退出: {}", user.id);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionUser>> {
        self.tx.subscribe()
    }
}

/// 动态列表筛选条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// 为空表示不限类别
    pub categories: BTreeSet<String>,
    /// 附近的人搜索半径
    pub radius_km: Option<f64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self == &Filters::default()
    }

    /// 判断动态是否满足筛选条件；未排期的动态不受时间范围限制
    pub fn matches(&self, moment: &Moment) -> bool {
        if !self.categories.is_empty() {
            match &moment.category {
                Some(c) if self.categories.contains(c) => {}
                _ => return false,
            }
        }
        if let Some(when) = moment.when_at {
            if self.date_from.map(|from| when < from).unwrap_or(false) {
                return false;
            }
            if self.date_to.map(|to| when > to).unwrap_or(false) {
                return false;
            }
        }
        true
    }
}

/// 筛选条件容器
pub struct FilterContext {
    tx: watch::Sender<Filters>,
}

impl Default for FilterContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Filters::default());
        Self { tx }
    }

    pub fn get(&self) -> Filters {
        self.tx.borrow().clone()
    }

    pub fn set(&self, filters: Filters) {
        self.tx.send_replace(filters);
    }

    /// 原地修改筛选条件
    pub fn update<F: FnOnce(&mut Filters)>(&self, f: F) {
        self.tx.send_modify(f);
    }

    /// 切换某个类别的选中状态，返回切换后是否选中
    pub fn toggle_category(&self, category: &str) -> bool {
        let mut selected = false;
        self.tx.send_modify(|filters| {
            if !filters.categories.remove(category) {
                filters.categories.insert(category.to_string());
                selected = true;
            }
        });
        selected
    }

    pub fn reset(&self) {
        self.tx.send_replace(Filters::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<Filters> {
        self.tx.subscribe()
    }
}
