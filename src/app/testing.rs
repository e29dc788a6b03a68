//! 单测共用的内存后端与反馈监听器

use crate::app::backend::{Backend, Filter, SelectRequest};
use crate::app::feedback::FeedbackListener;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Once};

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,moments_sdk_core=debug");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// 一次后端调用的记录
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Select(SelectRequest),
    Insert { table: String, rows: Value },
    Count { table: String, filters: Vec<Filter> },
    Update { table: String, filters: Vec<Filter>, patch: Value },
    Delete { table: String, filters: Vec<Filter> },
    Rpc { name: String, args: Value },
    Invoke { name: String, body: Value },
}

impl Call {
    /// 路由键，例如 `select:moments`、`rpc:join_city_group`
    pub fn route(&self) -> String {
        match self {
            Call::Select(req) => format!("select:{}", req.table),
            Call::Insert { table, .. } => format!("insert:{}", table),
            Call::Count { table, .. } => format!("count:{}", table),
            Call::Update { table, .. } => format!("update:{}", table),
            Call::Delete { table, .. } => format!("delete:{}", table),
            Call::Rpc { name, .. } => format!("rpc:{}", name),
            Call::Invoke { name, .. } => format!("invoke:{}", name),
        }
    }
}

type Handler = Box<dyn Fn(&Call) -> Result<Value, String> + Send + Sync>;

/// 内存后端：按路由键返回预设响应并记录所有调用
///
/// 同一路由的排队响应依次消费，最后一个会被重复使用。
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<Call>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    handlers: Mutex<HashMap<String, Handler>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, route: &str, value: Value) -> &Self {
        self.push(route, Ok(value))
    }

    pub fn fail(&self, route: &str, message: &str) -> &Self {
        self.push(route, Err(message.to_string()))
    }

    pub fn handle<F>(&self, route: &str, handler: F) -> &Self
    where
        F: Fn(&Call) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(route.to_string(), Box::new(handler));
        self
    }

    fn push(&self, route: &str, response: Result<Value, String>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, route: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.route() == route)
            .collect()
    }

    pub fn call_count(&self, route: &str) -> usize {
        self.calls_to(route).len()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    fn dispatch(&self, call: Call, default: Value) -> Result<Value> {
        let route = call.route();
        self.calls.lock().unwrap().push(call.clone());

        if let Some(handler) = self.handlers.lock().unwrap().get(&route) {
            return handler(&call).map_err(|e| anyhow::anyhow!(e));
        }

        let mut queued = self.queued.lock().unwrap();
        let response = match queued.get_mut(&route) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(default),
        }
    }

    fn dispatch_rows(&self, call: Call, default: Value) -> Result<Vec<Value>> {
        match self.dispatch(call, default)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>> {
        self.dispatch_rows(Call::Select(request.clone()), Value::Array(Vec::new()))
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<Vec<Value>> {
        let echo = rows.clone();
        self.dispatch_rows(
            Call::Insert {
                table: table.to_string(),
                rows,
            },
            echo,
        )
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let value = self.dispatch(
            Call::Count {
                table: table.to_string(),
                filters: filters.to_vec(),
            },
            Value::from(0u64),
        )?;
        value
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("count response is not a number: {}", value))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        self.dispatch_rows(
            Call::Update {
                table: table.to_string(),
                filters: filters.to_vec(),
                patch,
            },
            Value::Array(Vec::new()),
        )
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        self.dispatch_rows(
            Call::Delete {
                table: table.to_string(),
                filters: filters.to_vec(),
            },
            Value::Array(Vec::new()),
        )
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        self.dispatch(
            Call::Rpc {
                name: function.to_string(),
                args,
            },
            Value::Null,
        )
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value> {
        self.dispatch(
            Call::Invoke {
                name: function.to_string(),
                body,
            },
            Value::Null,
        )
    }

    fn set_access_token(&self, token: Option<String>) {
        self.tokens.lock().unwrap().push(token);
    }
}

/// 记录所有反馈的监听器
#[derive(Default)]
pub struct RecordingFeedback {
    pub successes: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<(String, String)>>,
}

impl RecordingFeedback {
    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedbackListener for RecordingFeedback {
    async fn on_success(&self, message: String) {
        self.successes.lock().unwrap().push(message);
    }

    async fn on_error(&self, message: String, detail: String) {
        self.errors.lock().unwrap().push((message, detail));
    }
}
