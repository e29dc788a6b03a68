//! 动态（活动）与邀请模块

pub mod models;
pub mod service;

pub use models::{InviteStatus, Moment, MomentDetail, MomentInvite, MomentUpdate, NewMoment};
pub use service::MomentService;
