//! 查询缓存键与实体标签

use std::collections::BTreeSet;
use std::fmt;

/// 实体类型标签，失效按标签匹配而不是按键前缀匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityTag {
    Profile,
    Moment,
    Invite,
    Friendship,
    Notification,
    NearbyUser,
    CityGroup,
    GeocodingToken,
}

impl EntityTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityTag::Profile => "profile",
            EntityTag::Moment => "moment",
            EntityTag::Invite => "invite",
            EntityTag::Friendship => "friendship",
            EntityTag::Notification => "notification",
            EntityTag::NearbyUser => "nearby_user",
            EntityTag::CityGroup => "city_group",
            EntityTag::GeocodingToken => "geocoding_token",
        }
    }
}

/// 查询缓存键：主标签 + 参数元组 + 附加标签
///
/// 聚合了多种实体的查询（例如带参与者资料的动态详情）应通过 [`QueryKey::also`]
/// 声明所有依赖的实体，任何一种实体变更都会使其失效。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    tag: EntityTag,
    parts: Vec<String>,
    extra_tags: BTreeSet<EntityTag>,
}

impl QueryKey {
    pub fn new(tag: EntityTag) -> Self {
        Self {
            tag,
            parts: Vec::new(),
            extra_tags: BTreeSet::new(),
        }
    }

    /// 追加一个参数
    pub fn part(mut self, part: impl ToString) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// 声明额外依赖的实体
    pub fn also(mut self, tag: EntityTag) -> Self {
        if tag != self.tag {
            self.extra_tags.insert(tag);
        }
        self
    }

    pub fn tag(&self) -> EntityTag {
        self.tag
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn has_tag(&self, tag: EntityTag) -> bool {
        self.tag == tag || self.extra_tags.contains(&tag)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag.as_str())?;
        for part in &self.parts {
            write!(f, "/{}", part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_primary_and_extra_only() {
        let key = QueryKey::new(EntityTag::Moment)
            .part("detail")
            .part("m1")
            .also(EntityTag::Profile);
        assert!(key.has_tag(EntityTag::Moment));
        assert!(key.has_tag(EntityTag::Profile));
        assert!(!key.has_tag(EntityTag::Invite));
        assert_eq!(key.to_string(), "moment/detail/m1");
    }

    #[test]
    fn parts_that_look_like_other_tags_do_not_match() {
        // 参数里出现其他实体名不会导致误失效
        let key = QueryKey::new(EntityTag::Moment).part("profile");
        assert!(!key.has_tag(EntityTag::Profile));
    }
}
