//! 通讯录好友匹配（客户端侧）

pub mod models;
pub mod service;

pub use models::{hash_phone, normalize_phone, ContactMatch, MatchResponse, MAX_PHONE_HASHES};
pub use service::ContactsService;
