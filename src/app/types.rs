//! 通用 HTTP 响应处理与行解码工具

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 通用 HTTP 响应处理函数：检查状态码并直接反序列化 body
///
/// 204 或空 body 按 JSON `null` 处理，所有 REST / RPC / 函数调用共用此方法
pub async fn handle_http_response<T: DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }

    let raw: &[u8] = if body_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        b"null"
    } else {
        &body_bytes
    };

    serde_json::from_slice(raw).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })
}

/// 把后端返回的 JSON 行解码为业务结构体
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> anyhow::Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).with_context(|| format!("解析{}失败", what)))
        .collect()
}

/// 解码单行，后端没有返回任何行时得到 `None`
pub fn decode_first<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> anyhow::Result<Option<T>> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(
            serde_json::from_value(row).with_context(|| format!("解析{}失败", what))?,
        )),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Row {
        id: String,
        #[serde(default, deserialize_with = "deserialize_vec_or_null")]
        tags: Vec<String>,
    }

    #[test]
    fn null_arrays_decode_as_empty() {
        let rows = vec![json!({"id": "a", "tags": null}), json!({"id": "b", "tags": ["x"]})];
        let decoded: Vec<Row> = decode_rows(rows, "测试行").unwrap();
        assert!(decoded[0].tags.is_empty());
        assert_eq!(decoded[1].tags, vec!["x".to_string()]);
    }

    #[test]
    fn decode_first_on_empty_is_none() {
        let first: Option<Row> = decode_first(Vec::new(), "测试行").unwrap();
        assert!(first.is_none());
        let first: Option<Row> = decode_first(vec![json!({"id": "z"})], "测试行").unwrap();
        assert_eq!(first.unwrap().id, "z");
    }

    #[test]
    fn malformed_row_is_an_error() {
        let result: anyhow::Result<Vec<Row>> = decode_rows(vec![json!({"nope": 1})], "测试行");
        assert!(result.is_err());
    }
}
