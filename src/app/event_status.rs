//! 活动时间状态推导（纯函数）

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 距开始不足该时长视为即将开始
pub const STARTING_SOON_WINDOW_MINUTES: i64 = 30;
/// 距结束不足该时长视为即将结束
pub const ENDING_SOON_WINDOW_MINUTES: i64 = 60;

/// 活动时间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    StartingSoon,
    InProgress,
    EndingSoon,
    Ended,
    Upcoming,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::StartingSoon => "starting_soon",
            EventStatus::InProgress => "in_progress",
            EventStatus::EndingSoon => "ending_soon",
            EventStatus::Ended => "ended",
            EventStatus::Upcoming => "upcoming",
        }
    }
}

/// 根据开始/结束时间计算状态
///
/// 已开始且没有结束时间的活动始终是 `InProgress`；没有开始时间的活动在结束时间
/// 未过去时视为 `Upcoming`。
pub fn get_event_status(
    when_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> EventStatus {
    if let Some(end) = end_at {
        if end <= now {
            return EventStatus::Ended;
        }
    }

    let Some(start) = when_at else {
        return EventStatus::Upcoming;
    };

    if start <= now {
        return match end_at {
            Some(end) if end - now < Duration::minutes(ENDING_SOON_WINDOW_MINUTES) => {
                EventStatus::EndingSoon
            }
            _ => EventStatus::InProgress,
        };
    }

    if start - now < Duration::minutes(STARTING_SOON_WINDOW_MINUTES) {
        EventStatus::StartingSoon
    } else {
        EventStatus::Upcoming
    }
}

/// 列表中是否展示该活动：未排期的总是展示，已结束的不展示
pub fn should_display_event(
    when_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if when_at.is_none() {
        return true;
    }
    get_event_status(when_at, end_at, now) != EventStatus::Ended
}
