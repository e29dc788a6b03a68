pub mod app;
pub mod functions;

// 重新导出常用类型和函数，方便外部使用
pub use app::{
    cache::{QueryClient, QueryResult, Subscription},
    client::{ClientConfig, MomentsClient},
    context::{Filters, SessionUser},
    event_status::{get_event_status, should_display_event, EventStatus},
    feedback::{FeedbackListener, LogFeedbackListener},
    SdkError,
};
