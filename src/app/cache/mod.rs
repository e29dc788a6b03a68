//! 客户端查询缓存
//!
//! 所有服务的读请求都经由 [`QueryClient`] 缓存，写请求成功后按 [`EntityTag`] 失效。

pub mod key;
pub mod poller;
pub mod query;

pub use key::{EntityTag, QueryKey};
pub use poller::{PollHandle, Subscription};
pub use query::{MutationOptions, QueryClient, QueryOptions, QueryResult, DEFAULT_STALE_TIME};
