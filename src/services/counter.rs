use crate::{
    error::Result,
    models::{
        collections, comment::Comment, event::ChangeKind, follow::Follow, like::Like,
    },
    services::{
        database::WriteBatch, idempotency::HandlerOutcome, notification::NotificationService,
        Database,
    },
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const COMMENT_COUNT: &str = "commentCount";
pub const LIKE_COUNT: &str = "likeCount";
pub const FOLLOWER_COUNT: &str = "followerCount";
pub const FOLLOWING_COUNT: &str = "followingCount";

/// 计数一致性引擎
///
/// 只响应创建/删除；计数通过存储的原子增量修改，不做钳制。
#[derive(Clone)]
pub struct CounterService {
    db: Arc<Database>,
    notifications: NotificationService,
}

fn delta_for(kind: ChangeKind) -> Option<i64> {
    match kind {
        ChangeKind::Created => Some(1),
        ChangeKind::Deleted => Some(-1),
        ChangeKind::Updated => None,
    }
}

impl CounterService {
    pub async fn new(db: Arc<Database>, notifications: NotificationService) -> Result<Self> {
        Ok(Self { db, notifications })
    }

    pub async fn apply_comment(&self, comment: &Comment, kind: ChangeKind) -> HandlerOutcome {
        let Some(delta) = delta_for(kind) else {
            return HandlerOutcome::Skipped("comment updates do not change counters".to_string());
        };
        self.adjust(collections::POSTS, &comment.post_id, COMMENT_COUNT, delta)
            .await
    }

    pub async fn apply_like(&self, like: &Like, kind: ChangeKind) -> HandlerOutcome {
        let Some(delta) = delta_for(kind) else {
            return HandlerOutcome::Skipped("like updates do not change counters".to_string());
        };
        self.adjust(collections::POSTS, &like.post_id, LIKE_COUNT, delta)
            .await
    }

    /// 关注双方的计数在同一批次中修改；创建时关注通知也写进这个批次
    pub async fn apply_follow(&self, follow: &Follow, kind: ChangeKind) -> HandlerOutcome {
        if follow.is_self_follow() {
            warn!(user_id = %follow.follower_id, "Ignoring self-follow event");
            return HandlerOutcome::Skipped("self-follow".to_string());
        }
        let Some(delta) = delta_for(kind) else {
            return HandlerOutcome::Skipped("follow updates do not change counters".to_string());
        };

        let mut batch = WriteBatch::new();
        batch
            .increment(collections::USERS, &follow.following_id, FOLLOWER_COUNT, delta)
            .increment(collections::USERS, &follow.follower_id, FOLLOWING_COUNT, delta);

        let mut notification = None;
        if kind == ChangeKind::Created {
            match self.notifications.prepare_follow(follow).await {
                Ok(Some(prepared)) => match NotificationService::add_to_batch(&prepared, &mut batch) {
                    Ok(()) => notification = Some(prepared),
                    Err(e) => warn!(error = %e, "Failed to encode follow notification"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to prepare follow notification"),
            }
        }

        match self.db.commit(batch).await {
            Ok(()) => {
                info!(
                    follower = %follow.follower_id,
                    following = %follow.following_id,
                    delta = delta,
                    "Follow counters updated"
                );
                if let Some(prepared) = &notification {
                    self.notifications.deliver_push(prepared).await;
                }
                HandlerOutcome::Applied
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    follower = %follow.follower_id,
                    following = %follow.following_id,
                    "User missing, follow counters not updated: {}", e
                );
                HandlerOutcome::Skipped(e.to_string())
            }
            Err(e) => {
                error!(
                    follower = %follow.follower_id,
                    following = %follow.following_id,
                    "Failed to update follow counters: {}", e
                );
                HandlerOutcome::Failed(e.to_string())
            }
        }
    }

    async fn adjust(&self, collection: &str, id: &str, field: &str, delta: i64) -> HandlerOutcome {
        debug!("Adjusting {}/{}.{} by {}", collection, id, field, delta);

        match self.db.increment(collection, id, field, delta).await {
            Ok(()) => {
                info!(collection = collection, id = %id, field = field, delta = delta, "Counter updated");
                HandlerOutcome::Applied
            }
            // 父文档已被删除，属于正常竞态
            Err(e) if e.is_not_found() => {
                warn!(collection = collection, id = %id, field = field, "Parent document gone, counter not updated");
                HandlerOutcome::Skipped(e.to_string())
            }
            Err(e) => {
                error!(collection = collection, id = %id, field = field, "Counter update failed: {}", e);
                HandlerOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{database::DocumentStore, memory::MemoryStore};
    use crate::services::push::DisabledPushGateway;
    use chrono::Utc;
    use serde_json::json;

    async fn setup() -> (CounterService, Arc<MemoryStore>) {
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
        (CounterService::new(db, notifications).await.unwrap(), store)
    }

    fn comment(post_id: &str) -> Comment {
        Comment {
            id: "c1".to_string(),
            post_id: post_id.to_string(),
            author_id: "b".to_string(),
            text: "nice".to_string(),
            created_at: Utc::now(),
        }
    }

    fn follow(follower: &str, following: &str) -> Follow {
        Follow {
            id: Follow::edge_id(follower, following),
            follower_id: follower.to_string(),
            following_id: following.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_comment_counter_up_and_down() {
        let (counters, store) = setup().await;

        counters.apply_comment(&comment("p1"), ChangeKind::Created).await;
        counters.apply_comment(&comment("p1"), ChangeKind::Created).await;
        counters.apply_comment(&comment("p1"), ChangeKind::Deleted).await;

        let post = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(post["commentCount"], 1);
    }

    #[tokio::test]
    async fn test_missing_parent_is_benign() {
        let (counters, _) = setup().await;
        let outcome = counters.apply_comment(&comment("gone"), ChangeKind::Created).await;
        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_update_is_ignored() {
        let (counters, store) = setup().await;
        let outcome = counters.apply_comment(&comment("p1"), ChangeKind::Updated).await;

        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));
        let post = store.get("posts", "p1").await.unwrap().unwrap();
        assert!(post.get("commentCount").is_none());
    }

    #[tokio::test]
    async fn test_follow_moves_both_counters_with_notification() {
        let (counters, store) = setup().await;

        let outcome = counters.apply_follow(&follow("a", "b"), ChangeKind::Created).await;
        assert_eq!(outcome, HandlerOutcome::Applied);

        let a = store.get("users", "a").await.unwrap().unwrap();
        let b = store.get("users", "b").await.unwrap().unwrap();
        assert_eq!(a["followingCount"], 1);
        assert_eq!(b["followerCount"], 1);

        let notifications = store.documents("notifications");
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["type"], "follow");
        assert_eq!(notifications[0]["recipientUserId"], "b");
    }

    #[tokio::test]
    async fn test_follow_with_missing_user_changes_nothing() {
        let (counters, store) = setup().await;

        let outcome = counters.apply_follow(&follow("a", "ghost"), ChangeKind::Created).await;
        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));

        let a = store.get("users", "a").await.unwrap().unwrap();
        assert!(a.get("followingCount").is_none());
        assert_eq!(store.count("notifications"), 0);
    }

    #[tokio::test]
    async fn test_self_follow_never_counts() {
        let (counters, store) = setup().await;

        let outcome = counters.apply_follow(&follow("a", "a"), ChangeKind::Created).await;
        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));

        let a = store.get("users", "a").await.unwrap().unwrap();
        assert!(a.get("followerCount").is_none());
        assert!(a.get("followingCount").is_none());
    }
}
