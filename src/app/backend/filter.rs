//! 查询过滤条件与 REST 查询参数编码

use serde_json::Value;

/// 行过滤条件（对应 REST 接口的 `列=操作符.值` 语法）
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// 集合成员判断
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
    /// 不区分大小写的模糊匹配，`*` 为通配符
    ILike(String, String),
    /// 数组列包含给定的全部元素
    Contains(String, Vec<Value>),
    /// 任一子条件成立
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn neq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Neq(column.to_string(), value.into())
    }

    pub fn gte(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(column.to_string(), value.into())
    }

    pub fn lte(column: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(column.to_string(), value.into())
    }

    pub fn is_null(column: &str) -> Self {
        Filter::IsNull(column.to_string())
    }

    pub fn in_list<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::Contains(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// 编码为一个查询参数对
    pub fn query_pair(&self) -> (String, String) {
        match self {
            Filter::Or(inner) => ("or".to_string(), format!("({})", join_nested(inner))),
            other => {
                let (column, condition) = other.column_condition();
                (column.to_string(), condition)
            }
        }
    }

    /// 拆成列名与 `操作符.值` 两部分；`Or` 自身没有列名
    fn column_condition(&self) -> (&str, String) {
        match self {
            Filter::Eq(c, v) => (c, format!("eq.{}", scalar(v))),
            Filter::Neq(c, v) => (c, format!("neq.{}", scalar(v))),
            Filter::Gt(c, v) => (c, format!("gt.{}", scalar(v))),
            Filter::Gte(c, v) => (c, format!("gte.{}", scalar(v))),
            Filter::Lt(c, v) => (c, format!("lt.{}", scalar(v))),
            Filter::Lte(c, v) => (c, format!("lte.{}", scalar(v))),
            Filter::In(c, vs) => (c, format!("in.({})", list(vs))),
            Filter::IsNull(c) => (c, "is.null".to_string()),
            Filter::NotNull(c) => (c, "not.is.null".to_string()),
            Filter::ILike(c, pattern) => (c, format!("ilike.{}", pattern)),
            Filter::Contains(c, vs) => (c, format!("cs.{{{}}}", list(vs))),
            Filter::Or(inner) => ("", format!("or({})", join_nested(inner))),
        }
    }
}

fn join_nested(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(|f| match f {
            Filter::Or(_) => f.column_condition().1,
            _ => {
                let (column, condition) = f.column_condition();
                format!("{}.{}", column, condition)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn list(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            // 含保留字符的字符串需要加引号
            Value::String(s) if s.contains([',', '(', ')', '{', '}', '"']) => {
                format!("\"{}\"", s.replace('"', "\\\""))
            }
            other => scalar(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// 排序条件
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// 表查询请求
#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl SelectRequest {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 生成完整的查询参数列表
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        pairs.extend(self.filters.iter().map(Filter::query_pair));
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| {
                    format!(
                        "{}.{}",
                        o.column,
                        if o.ascending { "asc" } else { "desc" }
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}
