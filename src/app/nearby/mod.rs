//! 附近的人

pub mod models;
pub mod service;

pub use models::{GeoPoint, NearbyUser};
pub use service::{NearbyService, DEFAULT_RADIUS_KM, NEARBY_POLL_INTERVAL};
