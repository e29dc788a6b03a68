//! AI 聊天代理：通过云函数转发对话

pub mod models;
pub mod service;

pub use models::{ChatMessage, ChatRole};
pub use service::{AiChatService, MAX_HISTORY_MESSAGES};
