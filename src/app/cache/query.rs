//! 查询缓存与写操作执行器
//!
//! 读：命中新鲜缓存直接返回，否则发起一次请求；失败时保留旧数据并记录错误。
//! 写：只在后端确认成功后按实体标签失效相关查询，不做乐观更新。

use crate::app::cache::key::{EntityTag, QueryKey};
use crate::app::feedback::{FeedbackListener, LogFeedbackListener};
use anyhow::Result;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 默认新鲜期：5 分钟
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// 查询结果（data 在首次加载完成前为空）
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<Arc<anyhow::Error>>,
}

impl<T> QueryResult<T> {
    /// 未启用、也没有缓存的查询
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }

    /// 转换数据，保留加载状态与错误
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> QueryResult<U> {
        QueryResult {
            data: self.data.map(f),
            is_loading: self.is_loading,
            error: self.error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.data.is_some()
    }

    /// 转换为 `Result`：有错误时返回错误，未加载时视为错误
    pub fn into_result(self) -> Result<T> {
        if let Some(err) = self.error {
            return Err(anyhow::anyhow!("{:#}", err));
        }
        self.data
            .ok_or_else(|| anyhow::anyhow!("查询未启用或尚未加载"))
    }
}

/// 查询参数
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub key: QueryKey,
    /// `None` 时使用 [`QueryClient`] 的默认新鲜期
    pub stale_time: Option<Duration>,
    /// 所需参数缺失时为 `false`，此时不发请求
    pub enabled: bool,
    /// 忽略新鲜期强制请求（轮询使用）
    pub force: bool,
}

impl QueryOptions {
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            stale_time: None,
            enabled: true,
            force: false,
        }
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// 写操作参数
#[derive(Debug, Clone)]
pub struct MutationOptions {
    /// 操作名（日志用）
    pub name: String,
    /// 成功后需要失效的实体
    pub invalidates: Vec<EntityTag>,
    /// 成功提示，`None` 表示静默
    pub success_message: Option<String>,
    /// 失败提示
    pub error_message: String,
}

impl MutationOptions {
    pub fn new(name: &str, invalidates: &[EntityTag]) -> Self {
        Self {
            name: name.to_string(),
            invalidates: invalidates.to_vec(),
            success_message: None,
            error_message: format!("{}失败", name),
        }
    }

    pub fn success(mut self, message: &str) -> Self {
        self.success_message = Some(message.to_string());
        self
    }

    pub fn error(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }
}

struct CacheEntry {
    data: Option<Arc<dyn Any + Send + Sync>>,
    updated_at: Option<Instant>,
    invalidated: bool,
    is_loading: bool,
    error: Option<Arc<anyhow::Error>>,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            data: None,
            updated_at: None,
            invalidated: false,
            is_loading: false,
            error: None,
        }
    }

    fn data_as<T: Clone + 'static>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|d| d.downcast_ref::<T>())
            .cloned()
    }

    fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
        match self.updated_at {
            Some(at) => !self.invalidated && now.duration_since(at) < stale_time,
            None => false,
        }
    }
}

/// 查询缓存客户端（应用根对象持有，所有服务共享）
pub struct QueryClient {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    default_stale_time: Duration,
    feedback: RwLock<Arc<dyn FeedbackListener>>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIME)
    }
}

impl QueryClient {
    pub fn new(default_stale_time: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_stale_time,
            feedback: RwLock::new(Arc::new(LogFeedbackListener)),
        }
    }

    /// 注册写操作反馈监听器
    pub fn set_feedback_listener(&self, listener: Arc<dyn FeedbackListener>) {
        if let Ok(mut guard) = self.feedback.write() {
            *guard = listener;
        }
    }

    fn feedback(&self) -> Arc<dyn FeedbackListener> {
        match self.feedback.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 执行查询
    pub async fn fetch<T, F, Fut>(&self, options: QueryOptions, fetcher: F) -> QueryResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = options.key;
        let stale_time = options.stale_time.unwrap_or(self.default_stale_time);

        if !options.enabled {
            debug!("[Cache] 查询 {} 未启用，跳过请求", key);
            let mut snapshot = self.state::<T>(&key);
            snapshot.is_loading = false;
            return snapshot;
        }

        if !options.force {
            if let Some(data) = self.fresh_data::<T>(&key, stale_time) {
                debug!("[Cache] 命中缓存: {}", key);
                return QueryResult {
                    data: Some(data),
                    is_loading: false,
                    error: None,
                };
            }
        }

        self.begin_loading(&key);
        debug!("[Cache] 📡 请求: {}", key);

        match fetcher().await {
            Ok(data) => {
                self.store(&key, data.clone());
                QueryResult {
                    data: Some(data),
                    is_loading: false,
                    error: None,
                }
            }
            Err(err) => {
                warn!("[Cache] 查询 {} 失败: {:#}", key, err);
                let err = Arc::new(err);
                let prior = self.record_error::<T>(&key, err.clone());
                QueryResult {
                    data: prior,
                    is_loading: false,
                    error: Some(err),
                }
            }
        }
    }

    /// 执行写操作：成功后按标签失效并反馈，失败只反馈
    pub async fn mutate<T, F, Fut>(&self, options: MutationOptions, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        info!("[Cache] ✏️ 执行写操作: {}", options.name);
        match op().await {
            Ok(value) => {
                let invalidated = self.invalidate_tags(&options.invalidates);
                debug!(
                    "[Cache] 写操作 {} 成功，失效查询数: {}",
                    options.name, invalidated
                );
                if let Some(message) = options.success_message {
                    self.feedback().on_success(message).await;
                }
                Ok(value)
            }
            Err(err) => {
                warn!("[Cache] 写操作 {} 失败: {:#}", options.name, err);
                self.feedback()
                    .on_error(options.error_message, format!("{:#}", err))
                    .await;
                Err(err)
            }
        }
    }

    fn fresh_data<T: Clone + 'static>(&self, key: &QueryKey, stale_time: Duration) -> Option<T> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if entry.is_fresh(stale_time, Instant::now()) {
            entry.data_as::<T>()
        } else {
            None
        }
    }

    fn begin_loading(&self, key: &QueryKey) {
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
        entry.is_loading = true;
    }

    fn store<T: Send + Sync + 'static>(&self, key: &QueryKey, data: T) {
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
        entry.data = Some(Arc::new(data));
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        entry.is_loading = false;
        entry.error = None;
    }

    fn record_error<T: Clone + 'static>(&self, key: &QueryKey, err: Arc<anyhow::Error>) -> Option<T> {
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
        entry.is_loading = false;
        entry.error = Some(err);
        entry.data_as::<T>()
    }

    /// 当前缓存状态快照（包含进行中的 `is_loading`）
    pub fn state<T: Clone + 'static>(&self, key: &QueryKey) -> QueryResult<T> {
        let entries = self.entries();
        match entries.get(key) {
            Some(entry) => QueryResult {
                data: entry.data_as::<T>(),
                is_loading: entry.is_loading,
                error: entry.error.clone(),
            },
            None => QueryResult::idle(),
        }
    }

    /// 读取缓存数据（不关心新鲜度）
    pub fn get_data<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        self.entries().get(key).and_then(|e| e.data_as::<T>())
    }

    /// 直接写入缓存数据
    pub fn set_data<T: Send + Sync + 'static>(&self, key: &QueryKey, data: T) {
        self.store(key, data);
    }

    /// 使带有某个实体标签的所有查询失效，返回失效数量
    pub fn invalidate_tag(&self, tag: EntityTag) -> usize {
        self.invalidate_tags(&[tag])
    }

    pub fn invalidate_tags(&self, tags: &[EntityTag]) -> usize {
        let mut entries = self.entries();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if tags.iter().any(|t| key.has_tag(*t)) {
                entry.invalidated = true;
                count += 1;
            }
        }
        count
    }

    pub fn invalidate_key(&self, key: &QueryKey) -> bool {
        match self.entries().get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        }
    }

    pub fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.entries()
            .get(key)
            .map(|e| e.invalidated)
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &QueryKey) {
        self.entries().remove(key);
    }

    /// 清空所有缓存（退出登录时调用）
    pub fn clear(&self) {
        let mut entries = self.entries();
        info!("[Cache] 🧹 清空查询缓存，共 {} 条", entries.len());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
