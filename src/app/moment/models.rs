//! 动态与邀请模型

use crate::app::event_status::{get_event_status, should_display_event, EventStatus};
use crate::app::profile::Profile;
use crate::app::types::deserialize_vec_or_null;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 动态（对应 `moments` 表，`deleted_at` 非空表示已软删除）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub participants: Vec<String>,
    #[serde(default)]
    pub when_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Moment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> EventStatus {
        get_event_status(self.when_at, self.end_at, now)
    }

    pub fn is_displayable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted() && should_display_event(self.when_at, self.end_at, now)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.creator_id == user_id || self.participants.iter().any(|p| p == user_id)
    }
}

/// 新建动态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMoment {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

/// 动态更新（只序列化有值的字段）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MomentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

impl MomentUpdate {
    pub fn is_empty(&self) -> bool {
        self == &MomentUpdate::default()
    }
}

/// 邀请状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Declined => "declined",
        }
    }
}

/// 动态邀请（对应 `moment_invites` 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentInvite {
    pub id: String,
    pub moment_id: String,
    pub inviter_id: String,
    pub invitee_id: String,
    pub status: InviteStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// 动态详情：动态本身、参与者资料与邀请列表
#[derive(Debug, Clone, PartialEq)]
pub struct MomentDetail {
    pub moment: Moment,
    pub participants: Vec<Profile>,
    pub invites: Vec<MomentInvite>,
}

impl MomentDetail {
    pub fn pending_invites(&self) -> impl Iterator<Item = &MomentInvite> {
        self.invites
            .iter()
            .filter(|i| i.status == InviteStatus::Pending)
    }
}
