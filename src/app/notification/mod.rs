//! 通知模块

pub mod models;
pub mod service;

pub use models::Notification;
pub use service::{NotificationService, UNREAD_POLL_INTERVAL};
