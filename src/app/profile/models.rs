//! 用户资料模型与资料完整度计算

use crate::app::types::deserialize_vec_or_null;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// 用户资料（对应 `profiles` 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// 当前心情
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub interests: Vec<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    /// 是否允许通过手机号被好友发现
    #[serde(default = "default_true")]
    pub phone_discoverable: bool,
}

impl Profile {
    /// 展示名：优先 name，其次 username
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.username.as_deref())
            .unwrap_or("")
    }
}

/// 资料更新（只序列化有值的字段）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_discoverable: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }
}

/// 资料完整度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCompleteness {
    /// 0..=100
    pub percent: u8,
    /// 缺失字段名，按权重从高到低
    pub missing: Vec<&'static str>,
}

impl ProfileCompleteness {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

// 权重合计 100
const WEIGHTS: [(&str, u8); 8] = [
    ("avatar_url", 20),
    ("name", 15),
    ("username", 15),
    ("bio", 15),
    ("interests", 15),
    ("city", 10),
    ("mood", 5),
    ("birthday", 5),
];

fn filled(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// 计算资料完整度
pub fn profile_completeness(profile: &Profile) -> ProfileCompleteness {
    let mut percent = 0u8;
    let mut missing = Vec::new();
    for (field, weight) in WEIGHTS {
        let present = match field {
            "avatar_url" => filled(&profile.avatar_url),
            "name" => filled(&profile.name),
            "username" => filled(&profile.username),
            "bio" => filled(&profile.bio),
            "interests" => !profile.interests.is_empty(),
            "city" => filled(&profile.city),
            "mood" => filled(&profile.mood),
            "birthday" => profile.birthday.is_some(),
            _ => false,
        };
        if present {
            percent += weight;
        } else {
            missing.push(field);
        }
    }
    ProfileCompleteness { percent, missing }
}
