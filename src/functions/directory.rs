//! 用户目录：按手机号哈希查找可被发现的用户

use crate::app::contacts::ContactMatch;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::debug;

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// 查找哈希命中的用户，排除调用者本人和关闭了手机号发现的用户
    async fn find_by_phone_hashes(
        &self,
        hashes: &[String],
        exclude_user_id: &str,
    ) -> Result<Vec<ContactMatch>>;
}

#[derive(Debug, sqlx::FromRow)]
struct DirectoryRow {
    id: String,
    name: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
    phone_hash: String,
}

impl From<DirectoryRow> for ContactMatch {
    fn from(row: DirectoryRow) -> Self {
        ContactMatch {
            id: row.id,
            name: row.name,
            username: row.username,
            avatar_url: row.avatar_url,
            phone_hash: row.phone_hash,
        }
    }
}

/// 基于 SQLite `profiles` 表的目录
#[derive(Clone)]
pub struct SqliteContactDirectory {
    pool: Pool<Sqlite>,
}

impl SqliteContactDirectory {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactDirectory for SqliteContactDirectory {
    async fn find_by_phone_hashes(
        &self,
        hashes: &[String],
        exclude_user_id: &str,
    ) -> Result<Vec<ContactMatch>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, username, avatar_url, phone_hash FROM profiles \
             WHERE phone_discoverable <> 0 AND id <> ",
        );
        builder.push_bind(exclude_user_id);
        builder.push(" AND phone_hash IN (");
        let mut separated = builder.separated(", ");
        for hash in hashes {
            separated.push_bind(hash.as_str());
        }
        separated.push_unseparated(") ORDER BY id");

        let rows: Vec<DirectoryRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("查询用户目录失败")?;
        debug!(
            "[Directory] {} 个哈希命中 {} 位用户",
            hashes.len(),
            rows.len()
        );
        Ok(rows.into_iter().map(ContactMatch::from).collect())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::seeded_directory;
    use super::*;
    use crate::app::contacts::hash_phone;

    #[tokio::test]
    async fn lookup_excludes_caller_and_hidden_profiles() {
        let directory = seeded_directory().await;
        let hashes: Vec<String> = (1..=5)
            .map(|i| hash_phone(&format!("+861380000000{}", i)))
            .collect();

        let matches = directory.find_by_phone_hashes(&hashes, "u1").await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u4"]);
        assert_eq!(matches[0].username.as_deref(), Some("lin"));
        assert_eq!(matches[0].phone_hash, hashes[1]);
    }

    #[tokio::test]
    async fn empty_input_matches_nothing() {
        let directory = seeded_directory().await;
        assert!(directory
            .find_by_phone_hashes(&[], "u1")
            .await
            .unwrap()
            .is_empty());
    }
}
