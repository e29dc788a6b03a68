//! 托管后端访问层
//!
//! 表读写、RPC 与云函数调用都通过 [`Backend`] 完成，业务服务只依赖该 trait。

pub mod auth;
pub mod filter;
pub mod rest;

pub use auth::{AuthApi, AuthUser};
pub use filter::{Filter, Order, SelectRequest};
pub use rest::RestBackend;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// 后端数据客户端（表、RPC、云函数）
#[async_trait]
pub trait Backend: Send + Sync {
    /// 读取表中的行
    async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>>;

    /// 插入一行或多行（`rows` 可以是对象或数组），返回写入后的行
    async fn insert(&self, table: &str, rows: Value) -> Result<Vec<Value>>;

    /// 满足条件的行数，由服务端精确计数，不下载行
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64>;

    /// 按条件更新，返回被更新的行
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>>;

    /// 按条件物理删除，返回被删除的行
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>>;

    /// 调用命名的远程过程
    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;

    /// 调用云函数
    async fn invoke(&self, function: &str, body: Value) -> Result<Value>;

    /// 切换后续请求使用的用户凭证，`None` 表示回退到匿名 key
    fn set_access_token(&self, _token: Option<String>) {}
}
