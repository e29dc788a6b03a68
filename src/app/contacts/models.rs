//! 手机号规范化、哈希与匹配结果
//!
//! 客户端和 `match-phone-contacts` 端点共用这些类型，只有哈希值会离开设备。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const MIN_PHONE_DIGITS: usize = 6;

/// 单次匹配请求最多处理的哈希数
pub const MAX_PHONE_HASHES: usize = 500;

/// 匹配到的用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMatch {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub phone_hash: String,
}

/// 端点响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    #[serde(default)]
    pub matches: Vec<ContactMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

/// 去掉空格、横线、括号等分隔符，只保留数字和开头的 `+`
///
/// 数字少于 6 位的视为无效号码。
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{}", digits))
    } else {
        Some(digits)
    }
}

/// 规范化后号码的 SHA-256（小写十六进制）
pub fn hash_phone(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}
