/// 文档序列化/反序列化辅助模块

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// 统一的时间戳格式：固定微秒精度的 RFC3339 UTC 字符串，
/// 字符串顺序即时间顺序
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub mod timestamp {
    use super::*;

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

pub mod option_timestamp {
    use super::*;

    pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
            None => Ok(None),
        }
    }
}

/// 处理 SurrealDB 的 Thing ID 格式，只保留纯 ID（不带 table 前缀）
///
/// 1.x 的 HTTP 引擎会把记录 ID 反序列化为 `{"tb": "...", "id": {"String": "..."}}`
pub fn plain_record_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(match s.split_once(':') {
            Some((_, id)) => id.trim_matches(|c| c == '`' || c == '⟨' || c == '⟩').to_string(),
            None => s.clone(),
        }),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => {
            let id = map.get("id")?;
            match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Object(inner) => inner
                    .get("String")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| inner.get("Number").map(|n| n.to_string())),
                _ => None,
            }
        }
        _ => None,
    }
}

/// 将存储返回的行的 `id` 字段规范化为纯字符串 ID
pub fn normalize_record_id(mut row: Value) -> Value {
    if let Some(obj) = row.as_object_mut() {
        if let Some(id) = obj.get("id").and_then(plain_record_id) {
            obj.insert("id".to_string(), Value::String(id));
        }
    }
    row
}
