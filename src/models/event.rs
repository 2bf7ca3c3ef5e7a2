use crate::utils::serde_helpers::plain_record_id;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 文档变更的类型，由前后状态推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// 事件分发器投递的一次文档变更：创建时没有 `before`，删除时没有 `after`
///
/// 投递语义是至少一次、跨文档无序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub collection: String,
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
}

impl DocumentEvent {
    pub fn created(collection: &str, after: Value) -> Self {
        Self {
            event_id: None,
            collection: collection.to_string(),
            before: None,
            after: Some(after),
        }
    }

    pub fn deleted(collection: &str, before: Value) -> Self {
        Self {
            event_id: None,
            collection: collection.to_string(),
            before: Some(before),
            after: None,
        }
    }

    pub fn kind(&self) -> Option<ChangeKind> {
        match (&self.before, &self.after) {
            (None, Some(_)) => Some(ChangeKind::Created),
            (Some(_), Some(_)) => Some(ChangeKind::Updated),
            (Some(_), None) => Some(ChangeKind::Deleted),
            (None, None) => None,
        }
    }

    /// 变更涉及的文档状态（删除时为删除前的状态）
    pub fn document(&self) -> Option<&Value> {
        self.after.as_ref().or(self.before.as_ref())
    }

    pub fn document_id(&self) -> Option<String> {
        self.document()
            .and_then(|doc| doc.get("id"))
            .and_then(plain_record_id)
    }

    /// 文档这一次存在的标识
    ///
    /// 同一个确定性 ID（如 `user~post`）可以被删除后重新创建，每次创建都会
    /// 得到新的 `createdAt`；删除事件的 `before` 带着被删那一次的 `createdAt`。
    /// 没有 `createdAt` 时退回到分发器给的 `eventId`。
    pub fn occurrence(&self) -> Option<String> {
        let created_at = self
            .document()
            .and_then(|doc| doc.get("createdAt"))
            .and_then(Value::as_str);

        match created_at {
            Some(raw) => Some(match DateTime::parse_from_rfc3339(raw) {
                Ok(at) => at.timestamp_micros().to_string(),
                Err(_) => raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect(),
            }),
            None => self.event_id.clone(),
        }
    }

    /// 幂等键：(集合, 文档 ID, 出现标识, 变更类型, 处理器)
    pub fn idempotency_key(&self, handler: &str) -> Option<String> {
        let kind = self.kind()?;
        let id = self.document_id()?;
        Some(match self.occurrence().filter(|o| !o.is_empty()) {
            Some(occurrence) => format!(
                "{}.{}.{}.{}.{}",
                self.collection,
                id,
                occurrence,
                kind.as_str(),
                handler
            ),
            None => format!("{}.{}.{}.{}", self.collection, id, kind.as_str(), handler),
        })
    }
}
