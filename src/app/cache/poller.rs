//! 定时轮询：以固定间隔强制刷新查询，生命周期绑定到订阅句柄

use crate::app::cache::query::{QueryClient, QueryOptions, QueryResult};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// 轮询任务句柄，取消或 drop 时停止轮询
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// 以 `period` 为间隔执行 `tick`，第一次立即执行
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick().await;
            }
        });
        Self { task: Some(task) }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 轮询订阅：持有轮询句柄和最新结果
pub struct Subscription<T> {
    handle: PollHandle,
    rx: watch::Receiver<QueryResult<T>>,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// 订阅一个查询：每 `period` 强制请求一次，结果写入缓存并推送给订阅方
    pub fn poll<F, Fut>(
        client: Arc<QueryClient>,
        options: QueryOptions,
        period: Duration,
        fetcher: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut initial = client.state::<T>(&options.key);
        initial.is_loading = options.enabled;
        let (tx, rx) = watch::channel(initial);
        let fetcher = Arc::new(fetcher);

        debug!(
            "[Poller] ⏱️ 开始轮询 {}，间隔 {:?}",
            options.key, period
        );

        let handle = PollHandle::spawn(period, move || {
            let client = client.clone();
            let options = options.clone().force(true);
            let fetcher = fetcher.clone();
            let tx = tx.clone();
            async move {
                let result = client.fetch(options, || (fetcher.as_ref())()).await;
                let _ = tx.send(result);
            }
        });

        Self { handle, rx }
    }

    /// 最近一次结果
    pub fn latest(&self) -> QueryResult<T> {
        self.rx.borrow().clone()
    }

    /// 等待下一次结果
    pub async fn changed(&mut self) -> Result<QueryResult<T>> {
        self.rx.changed().await.context("轮询已结束")?;
        Ok(self.rx.borrow_and_update().clone())
    }

    pub fn cancel(&mut self) {
        self.handle.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}
