//! 写操作结果反馈回调接口（界面层用它弹出提示）

use async_trait::async_trait;

/// 写操作结果监听器
#[async_trait]
pub trait FeedbackListener: Send + Sync {
    /// 写操作成功，参数为面向用户的提示文案
    async fn on_success(&self, message: String);

    /// 写操作失败，`detail` 为底层错误描述
    async fn on_error(&self, message: String, detail: String);
}

/// 默认实现，只写日志
pub struct LogFeedbackListener;

#[async_trait]
impl FeedbackListener for LogFeedbackListener {
    async fn on_success(&self, message: String) {
        tracing::info!("[Feedback] ✅ {}", message);
    }

    async fn on_error(&self, message: String, detail: String) {
        tracing::warn!("[Feedback] ❌ {}: {}", message, detail);
    }
}
