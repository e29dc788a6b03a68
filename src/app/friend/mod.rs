//! 好友关系模块

pub mod models;
pub mod service;

pub use models::{accepted_friend_ids, shared_friend_ids, Friendship, FriendshipStatus};
pub use service::FriendService;
