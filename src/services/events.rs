use crate::{
    error::Result,
    models::{
        collections,
        comment::Comment,
        decode,
        event::{ChangeKind, DocumentEvent},
        follow::Follow,
        like::Like,
        Document,
    },
    services::{
        counter::CounterService,
        idempotency::{HandlerOutcome, IdempotencyLedger, ProcessingResult},
        notification::NotificationService,
    },
    utils::serde_helpers::normalize_record_id,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const COUNTERS_HANDLER: &str = "counters";
pub const NOTIFY_HANDLER: &str = "notify";

/// 单个处理器对一次事件的执行记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRun {
    pub handler: &'static str,
    pub result: ProcessingResult,
}

/// 事件分发器：按集合把文档变更路由到计数引擎和通知扇出引擎
///
/// 投递是至少一次、跨文档无序的；每个处理器通过幂等账本去重。
#[derive(Clone)]
pub struct EventDispatcher {
    counters: CounterService,
    notifications: NotificationService,
    ledger: IdempotencyLedger,
    in_flight: Arc<Mutex<Vec<JoinHandle<Vec<HandlerRun>>>>>,
}

impl EventDispatcher {
    pub fn new(counters: CounterService, notifications: NotificationService, ledger: IdempotencyLedger) -> Self {
        Self {
            counters,
            notifications,
            ledger,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 在独立任务中处理事件，调用方不等待结果
    pub fn dispatch(&self, event: DocumentEvent) -> JoinHandle<Vec<HandlerRun>> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.handle(event).await })
    }

    /// 分发事件并登记任务，之后可以用 [`EventDispatcher::flush`] 等待
    pub fn publish(&self, event: DocumentEvent) {
        let handle = self.dispatch(event);
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|task| !task.is_finished());
        in_flight.push(handle);
    }

    /// 等待所有已登记的事件任务结束（关闭服务时使用）
    pub async fn flush(&self) -> usize {
        let tasks: Vec<_> = std::mem::take(&mut *self.in_flight.lock());
        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Event task failed: {}", e);
            }
        }
        count
    }

    /// 把一个实体作为变更事件发布
    pub fn publish_change<T: Document>(&self, kind: ChangeKind, entity: &T) -> Result<()> {
        let doc = serde_json::to_value(entity)?;
        let event = match kind {
            ChangeKind::Created => DocumentEvent::created(T::COLLECTION, doc),
            ChangeKind::Deleted => DocumentEvent::deleted(T::COLLECTION, doc),
            ChangeKind::Updated => DocumentEvent {
                event_id: None,
                collection: T::COLLECTION.to_string(),
                before: Some(doc.clone()),
                after: Some(doc),
            },
        };
        self.publish(event);
        Ok(())
    }

    pub async fn handle(&self, event: DocumentEvent) -> Vec<HandlerRun> {
        let Some(kind) = event.kind() else {
            warn!(collection = %event.collection, "Event has neither before nor after state");
            return Vec::new();
        };
        if kind == ChangeKind::Updated {
            debug!(collection = %event.collection, "Ignoring update event");
            return Vec::new();
        }

        debug!(
            collection = %event.collection,
            kind = kind.as_str(),
            id = ?event.document_id(),
            "Handling document event"
        );

        match event.collection.as_str() {
            collections::COMMENTS => {
                let Some(comment) = self.entity::<Comment>(&event) else {
                    return Vec::new();
                };
                let mut runs = vec![
                    self.run(&event, COUNTERS_HANDLER, || self.counters.apply_comment(&comment, kind))
                        .await,
                ];
                if kind == ChangeKind::Created {
                    runs.push(
                        self.run(&event, NOTIFY_HANDLER, || self.notifications.notify_comment(&comment))
                            .await,
                    );
                }
                runs
            }
            collections::LIKES => {
                let Some(like) = self.entity::<Like>(&event) else {
                    return Vec::new();
                };
                let mut runs = vec![
                    self.run(&event, COUNTERS_HANDLER, || self.counters.apply_like(&like, kind))
                        .await,
                ];
                if kind == ChangeKind::Created {
                    runs.push(
                        self.run(&event, NOTIFY_HANDLER, || self.notifications.notify_like(&like))
                            .await,
                    );
                }
                runs
            }
            // 关注通知在计数批次中一并写入
            collections::FOLLOWS => {
                let Some(follow) = self.entity::<Follow>(&event) else {
                    return Vec::new();
                };
                vec![
                    self.run(&event, COUNTERS_HANDLER, || self.counters.apply_follow(&follow, kind))
                        .await,
                ]
            }
            other => {
                debug!("No handlers registered for collection {}", other);
                Vec::new()
            }
        }
    }

    fn entity<T: Document>(&self, event: &DocumentEvent) -> Option<T> {
        let doc = normalize_record_id(event.document()?.clone());
        match decode::<T>(doc) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(collection = %event.collection, "Rejecting malformed event payload: {}", e);
                None
            }
        }
    }

    async fn run<F, Fut>(&self, event: &DocumentEvent, handler: &'static str, f: F) -> HandlerRun
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HandlerOutcome>,
    {
        let result = match event.idempotency_key(handler) {
            Some(key) => self.ledger.process_if_new(&key, f).await,
            None => ProcessingResult::Processed(f().await),
        };
        HandlerRun { handler, result }
    }
}

/// 事件接入接口的响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    pub collection: String,
    pub document_id: Option<String>,
    pub kind: Option<ChangeKind>,
}

impl From<&DocumentEvent> for EventAccepted {
    fn from(event: &DocumentEvent) -> Self {
        Self {
            collection: event.collection.clone(),
            document_id: event.document_id(),
            kind: event.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{database::DocumentStore, memory::MemoryStore, push::DisabledPushGateway, Database};
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (EventDispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.seed("users", json!({"id": "a", "username": "alice"})).unwrap();
        store.seed("users", json!({"id": "b", "username": "bob"})).unwrap();
        store
            .seed("posts", json!({"id": "p1", "authorId": "a", "createdAt": "2024-01-01T00:00:00.000000Z"}))
            .unwrap();

        let db = Arc::new(Database::with_store(store.clone(), 30));
        let notifications = NotificationService::new(db.clone(), Arc::new(DisabledPushGateway))
            .await
            .unwrap();
        let counters = CounterService::new(db.clone(), notifications.clone()).await.unwrap();
        (
            EventDispatcher::new(counters, notifications, IdempotencyLedger::new(db)),
            store,
        )
    }

    fn comment_doc() -> serde_json::Value {
        json!({
            "id": "c1",
            "postId": "p1",
            "authorId": "b",
            "text": "first!",
            "createdAt": "2024-01-01T00:00:01.000000Z"
        })
    }

    #[tokio::test]
    async fn test_comment_created_runs_both_handlers() {
        let (dispatcher, store) = setup().await;

        let runs = dispatcher.handle(DocumentEvent::created("comments", comment_doc())).await;

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].handler, COUNTERS_HANDLER);
        assert_eq!(runs[1].result, ProcessingResult::Processed(HandlerOutcome::Applied));
        assert_eq!(store.get("posts", "p1").await.unwrap().unwrap()["commentCount"], 1);
        assert_eq!(store.count("notifications"), 1);
    }

    #[tokio::test]
    async fn test_redelivery_is_noop() {
        let (dispatcher, store) = setup().await;
        let event = DocumentEvent::created("comments", comment_doc());

        dispatcher.handle(event.clone()).await;
        let runs = dispatcher.handle(event).await;

        assert!(runs.iter().all(|run| run.result == ProcessingResult::AlreadyProcessed));
        assert_eq!(store.get("posts", "p1").await.unwrap().unwrap()["commentCount"], 1);
        assert_eq!(store.count("notifications"), 1);
    }

    #[tokio::test]
    async fn test_surreal_style_ids_are_normalized() {
        let (dispatcher, store) = setup().await;
        let mut doc = comment_doc();
        doc["id"] = json!("comments:c1");

        dispatcher.handle(DocumentEvent::created("comments", doc)).await;
        assert!(store.get("processed_events", "comments.c1.1704067201000000.created.counters").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_updates_and_malformed_payloads_are_ignored() {
        let (dispatcher, _) = setup().await;

        let update = DocumentEvent {
            event_id: None,
            collection: "comments".to_string(),
            before: Some(comment_doc()),
            after: Some(comment_doc()),
        };
        assert!(dispatcher.handle(update).await.is_empty());

        let malformed = DocumentEvent::created("comments", json!({"id": "c9"}));
        assert!(dispatcher.handle(malformed).await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_waits_for_published_events() {
        let (dispatcher, store) = setup().await;
        let comment: Comment = decode(comment_doc()).unwrap();

        dispatcher.publish_change(ChangeKind::Created, &comment).unwrap();
        dispatcher.publish_change(ChangeKind::Deleted, &comment).unwrap();
        assert_eq!(dispatcher.flush().await, 2);

        assert_eq!(store.get("posts", "p1").await.unwrap().unwrap()["commentCount"], 0);
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_background() {
        let (dispatcher, store) = setup().await;
        let event = DocumentEvent::created(
            "likes",
            json!({"id": "b~p1", "userId": "b", "postId": "p1", "createdAt": "2024-01-01T00:00:01.000000Z"}),
        );

        let runs = dispatcher.dispatch(event).await.unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(store.get("posts", "p1").await.unwrap().unwrap()["likeCount"], 1);
    }
}
