use crate::app::types::deserialize_vec_or_null;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 同城群组（对应 `city_groups` 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityGroup {
    pub city_name: String,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub participants: Vec<String>,
}

impl CityGroup {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn member_count(&self) -> usize {
        self.participants.len()
    }
}

/// 按城市名建立索引，同名城市后出现的行覆盖前面的
pub fn index_by_city(groups: Vec<CityGroup>) -> BTreeMap<String, CityGroup> {
    groups
        .into_iter()
        .map(|g| (g.city_name.clone(), g))
        .collect()
}
