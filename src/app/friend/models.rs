//! 好友关系模型与纯计算函数

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 好友关系状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "pending",
            FriendshipStatus::Accepted => "accepted",
        }
    }
}

/// 好友关系（对应 `friendships` 表，一行代表一个方向）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friendship {
    pub user_id: String,
    pub friend_user_id: String,
    pub status: FriendshipStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Friendship {
    /// 关系中的另一方；与 `user_id` 无关的行返回 `None`
    pub fn other(&self, user_id: &str) -> Option<&str> {
        if self.user_id == user_id {
            Some(&self.friend_user_id)
        } else if self.friend_user_id == user_id {
            Some(&self.user_id)
        } else {
            None
        }
    }
}

/// 计算 `user_id` 的已接受好友集合
///
/// 同一对用户的所有行都为 accepted 时才算好友，单方向的 accepted 不算。
pub fn accepted_friend_ids(rows: &[Friendship], user_id: &str) -> BTreeSet<String> {
    let mut pairs: BTreeMap<&str, bool> = BTreeMap::new();
    for row in rows {
        let Some(other) = row.other(user_id) else {
            continue;
        };
        if other == user_id {
            continue;
        }
        let accepted = row.status == FriendshipStatus::Accepted;
        pairs
            .entry(other)
            .and_modify(|all| *all &= accepted)
            .or_insert(accepted);
    }
    pairs
        .into_iter()
        .filter(|(_, accepted)| *accepted)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// 两个好友集合的交集（不含双方自己）
pub fn shared_friend_ids(
    a: &str,
    a_friends: &BTreeSet<String>,
    b: &str,
    b_friends: &BTreeSet<String>,
) -> BTreeSet<String> {
    a_friends
        .intersection(b_friends)
        .filter(|id| id.as_str() != a && id.as_str() != b)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user: &str, friend: &str, status: FriendshipStatus) -> Friendship {
        Friendship {
            user_id: user.to_string(),
            friend_user_id: friend.to_string(),
            status,
            created_at: None,
        }
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pair_is_accepted_only_when_all_directions_agree() {
        use FriendshipStatus::*;
        let rows = vec![
            row("a", "b", Accepted),
            row("b", "a", Accepted),
            row("a", "c", Accepted),
            row("c", "a", Pending),
            row("d", "a", Accepted),
            row("a", "e", Pending),
        ];
        assert_eq!(accepted_friend_ids(&rows, "a"), set(&["b", "d"]));
    }

    #[test]
    fn unrelated_rows_are_ignored() {
        let rows = vec![row("x", "y", FriendshipStatus::Accepted)];
        assert!(accepted_friend_ids(&rows, "a").is_empty());
    }

    #[test]
    fn shared_friends_is_symmetric_intersection() {
        let a = set(&["c", "d", "b"]);
        let b = set(&["c", "d", "a", "e"]);
        let ab = shared_friend_ids("a", &a, "b", &b);
        let ba = shared_friend_ids("b", &b, "a", &a);
        assert_eq!(ab, set(&["c", "d"]));
        assert_eq!(ab, ba);
    }
}
