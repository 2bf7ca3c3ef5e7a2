use crate::error::{AppError, Result};
use crate::models::{collections, Document};
use crate::services::database::{Database, Query, SortDirection, WriteBatch, CREATED_AT};
use crate::services::periodic;
use crate::utils::serde_helpers::{format_timestamp, timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CLEANUP_BATCH_SIZE: usize = 500;

/// 单个事件处理器的执行结果；处理器从不向分发器返回错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 派生状态已更新
    Applied,
    /// 良性跳过：目标文档已不存在、自我关注、自己给自己的通知等
    Skipped(String),
    /// 出错，已记录日志；允许重投递时重试
    Failed(String),
}

impl HandlerOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, HandlerOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    Processed(HandlerOutcome),
    AlreadyProcessed,
}

/// 已处理事件记录，ID 即幂等键
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Document for ProcessedEvent {
    const COLLECTION: &'static str = collections::PROCESSED_EVENTS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// 事件幂等账本
///
/// 以幂等键为 ID 创建记录来"认领"一次处理，ID 冲突说明已处理过。
/// 处理失败时释放认领，让重投递有机会重试。
#[derive(Clone)]
pub struct IdempotencyLedger {
    db: Arc<Database>,
}

impl IdempotencyLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn is_processed(&self, key: &str) -> Result<bool> {
        Ok(self.db.get_by_id::<ProcessedEvent>(key).await?.is_some())
    }

    pub async fn process_if_new<F, Fut>(&self, key: &str, f: F) -> ProcessingResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HandlerOutcome>,
    {
        match self
            .db
            .store()
            .create(collections::PROCESSED_EVENTS, key, json!({}))
            .await
        {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => {
                debug!(key = %key, "Event already processed");
                return ProcessingResult::AlreadyProcessed;
            }
            Err(e) => {
                // 账本不可用时退化为至少一次语义
                warn!(key = %key, error = %e, "Failed to claim event, processing without ledger");
                return ProcessingResult::Processed(f().await);
            }
        }

        let outcome = f().await;
        if outcome.is_failed() {
            if let Err(e) = self.db.delete_by_id(collections::PROCESSED_EVENTS, key).await {
                warn!(key = %key, error = %e, "Failed to release claim for failed event");
            }
        }
        ProcessingResult::Processed(outcome)
    }

    /// 删除超过保留期的记录，返回删除数量
    pub async fn cleanup_old_events(&self, retention: Duration) -> Result<u64> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| AppError::Internal(format!("Invalid retention duration: {}", e)))?;
        let cutoff = format_timestamp(&(Utc::now() - retention));
        let mut deleted_count = 0u64;

        loop {
            let query = Query::new(collections::PROCESSED_EVENTS)
                .order_by(CREATED_AT, SortDirection::Ascending)
                .limit(CLEANUP_BATCH_SIZE);
            let oldest = self.db.store().query(&query).await?;

            let mut batch = WriteBatch::new();
            for doc in &oldest {
                let expired = doc
                    .get(CREATED_AT)
                    .and_then(|v| v.as_str())
                    .map_or(false, |created| created < cutoff.as_str());
                if !expired {
                    break;
                }
                if let Some(id) = doc.get("id").and_then(|v| v.as_str()) {
                    batch.delete(collections::PROCESSED_EVENTS, id);
                }
            }

            let expired = batch.len();
            self.db.commit(batch).await?;
            deleted_count += expired as u64;

            if expired < CLEANUP_BATCH_SIZE {
                break;
            }
        }

        if deleted_count > 0 {
            info!(deleted_count = deleted_count, cutoff = %cutoff, "Cleaned up old processed events");
        } else {
            debug!("No old events to cleanup");
        }

        Ok(deleted_count)
    }

    pub fn spawn_cleanup(self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = periodic(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.cleanup_old_events(retention).await {
                    warn!("Processed event cleanup failed: {}", e);
                }
            }
        })
    }
}
