use crate::app::ai_chat::models::{ChatMessage, ChatReply};
use crate::app::cache::MutationOptions;
use crate::app::client::AppContext;
use crate::app::error::SdkError;
use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const AI_CHAT_FUNCTION: &str = "ai-chat";

/// 随请求发送的历史消息上限（不含本次提问）
pub const MAX_HISTORY_MESSAGES: usize = 20;

pub struct AiChatService {
    ctx: Arc<AppContext>,
}

impl AiChatService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 发送一轮对话，返回助手的回复
    pub async fn send(&self, history: &[ChatMessage], prompt: &str) -> Result<ChatMessage> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SdkError::InvalidInput("prompt is empty".into()).into());
        }

        let skip = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
        let mut messages: Vec<ChatMessage> = history[skip..].to_vec();
        messages.push(ChatMessage::user(prompt));
        debug!("[AiChat] 发送 {} 条消息", messages.len());

        self.ctx
            .query
            .mutate(
                MutationOptions::new("AI 聊天", &[]).error("AI 暂时无法回复"),
                || async {
                    let response = self
                        .ctx
                        .backend
                        .invoke(AI_CHAT_FUNCTION, json!({ "messages": messages }))
                        .await
                        .context("调用 AI 聊天失败")?;
                    let reply: ChatReply =
                        serde_json::from_value(response).context("解析 AI 回复失败")?;
                    Ok(ChatMessage::assistant(reply.reply))
                },
            )
            .await
    }
}
