pub mod ai_chat;
pub mod backend;
pub mod cache;
pub mod city_group;
pub mod client;
pub mod contacts;
pub mod context;
pub mod error;
pub mod event_status;
pub mod feedback;
pub mod friend;
pub mod geocoding;
pub mod moment;
pub mod nearby;
pub mod notification;
pub mod profile;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出客户端入口
pub use client::{ClientConfig, MomentsClient};

// 重新导出共享状态与错误类型
pub use context::{AuthContext, FilterContext, Filters, SessionUser};
pub use error::SdkError;
