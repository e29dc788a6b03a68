//! SDK 中调用方需要区分处理的错误类型
//!
//! 其余错误统一以 `anyhow::Error` 返回；以下错误也包装在 anyhow 中，
//! 调用方通过 `downcast_ref::<SdkError>()` 识别。

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SdkError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

/// 判断错误链中是否为某个 [`SdkError`]
pub fn is_sdk_error(err: &anyhow::Error, expected: &SdkError) -> bool {
    err.downcast_ref::<SdkError>() == Some(expected)
}
