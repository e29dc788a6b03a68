//! 反向地理编码：令牌由后端云函数下发

pub mod service;

pub use service::{city_from_geocode, GeocodingService};
