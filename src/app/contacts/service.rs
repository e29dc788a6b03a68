use crate::app::client::AppContext;
use crate::app::contacts::models::{
    hash_phone, normalize_phone, ContactMatch, MatchResponse, MAX_PHONE_HASHES,
};
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const MATCH_FUNCTION: &str = "match-phone-contacts";

pub struct ContactsService {
    ctx: Arc<AppContext>,
}

impl ContactsService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 用通讯录号码匹配已注册用户
    ///
    /// 号码在本地规范化并哈希，按端点上限分批提交。
    pub async fn match_contacts(&self, phones: &[String]) -> Result<Vec<ContactMatch>> {
        self.ctx.require_user_id()?;

        let mut seen = HashSet::new();
        let hashes: Vec<String> = phones
            .iter()
            .filter_map(|raw| normalize_phone(raw))
            .map(|phone| hash_phone(&phone))
            .filter(|hash| seen.insert(hash.clone()))
            .collect();
        if hashes.is_empty() {
            debug!("[Contacts] 没有有效号码，跳过匹配");
            return Ok(Vec::new());
        }

        let mut matched_ids = HashSet::new();
        let mut matches = Vec::new();
        for batch in hashes.chunks(MAX_PHONE_HASHES) {
            let response = self
                .ctx
                .backend
                .invoke(MATCH_FUNCTION, json!({ "phoneHashes": batch }))
                .await
                .context("通讯录匹配请求失败")?;
            let parsed: MatchResponse =
                serde_json::from_value(response).context("解析通讯录匹配结果失败")?;
            matches.extend(
                parsed
                    .matches
                    .into_iter()
                    .filter(|m| matched_ids.insert(m.id.clone())),
            );
        }

        info!(
            "[Contacts] 📇 {} 个号码匹配到 {} 位用户",
            hashes.len(),
            matches.len()
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::test_support::*;
    use crate::app::testing::Call;

    #[tokio::test]
    async fn invalid_numbers_skip_the_request() {
        let (client, backend, _) = signed_in_client("me");
        let matches = client
            .contacts()
            .match_contacts(&["123".to_string(), "".to_string()])
            .await
            .unwrap();
        assert!(matches.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicates_are_hashed_once() {
        let (client, backend, _) = signed_in_client("me");
        let hash = hash_phone("+8613800138000");
        backend.respond(
            "invoke:match-phone-contacts",
            json!({ "matches": [{ "id": "u2", "name": "Lin", "phone_hash": hash }], "total": 1 }),
        );

        let matches = client
            .contacts()
            .match_contacts(&[
                "+86 138 0013 8000".to_string(),
                "+86-138-0013-8000".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "u2");

        let calls = backend.calls_to("invoke:match-phone-contacts");
        assert_eq!(
            calls,
            vec![Call::Invoke {
                name: "match-phone-contacts".to_string(),
                body: json!({ "phoneHashes": [hash] }),
            }]
        );
    }

    #[tokio::test]
    async fn large_address_books_are_sent_in_batches() {
        let (client, backend, _) = signed_in_client("me");
        backend.respond("invoke:match-phone-contacts", json!({ "matches": [] }));
        let phones: Vec<String> = (0..1200).map(|i| format!("1380000{:04}", i)).collect();
        client.contacts().match_contacts(&phones).await.unwrap();

        let sizes: Vec<usize> = backend
            .calls_to("invoke:match-phone-contacts")
            .iter()
            .map(|c| match c {
                Call::Invoke { body, .. } => body["phoneHashes"].as_array().unwrap().len(),
                _ => 0,
            })
            .collect();
        assert_eq!(sizes, vec![500, 500, 200]);
    }
}
