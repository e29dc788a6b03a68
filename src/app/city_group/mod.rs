//! 同城群组

pub mod models;
pub mod service;

pub use models::{index_by_city, CityGroup};
pub use service::CityGroupService;
