//! 用户资料模块

pub mod models;
pub mod service;

pub use models::{profile_completeness, Profile, ProfileCompleteness, ProfileUpdate};
pub use service::ProfileService;
