#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use photo_social::{
    config::Config,
    error::Result,
    models::notification::PushMessage,
    services::{
        database::DocumentStore, memory::MemoryStore, push::PushGateway,
        storage::MemoryBlobStorage, Database,
    },
    state::AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// 记录所有推送消息的网关
#[derive(Debug, Default)]
pub struct RecordingPushGateway {
    sent: Mutex<Vec<PushMessage>>,
}

impl RecordingPushGateway {
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryBlobStorage>,
    pub push: Arc<RecordingPushGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryBlobStorage::new());
        let push = Arc::new(RecordingPushGateway::default());
        let db = Arc::new(Database::with_store(store.clone(), config.in_query_limit));

        let state = AppState::build(config, db, storage.clone(), push.clone())
            .await
            .expect("app state");

        Self {
            state: Arc::new(state),
            store,
            storage,
            push,
        }
    }

    pub fn seed_user(&self, id: &str, username: &str, push_token: Option<&str>) {
        self.store
            .seed(
                "users",
                json!({
                    "id": id,
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "profileImageUrl": format!("https://cdn.example.com/{}.jpg", id),
                    "pushToken": push_token,
                    "followerCount": 0,
                    "followingCount": 0,
                }),
            )
            .expect("seed user");
    }

    /// `second` 决定帖子的创建时间，越大越新
    pub fn seed_post(&self, id: &str, author_id: &str, image_urls: &[&str], second: u32) {
        self.store
            .seed(
                "posts",
                json!({
                    "id": id,
                    "authorId": author_id,
                    "imageUrls": image_urls,
                    "caption": format!("post {}", id),
                    "likeCount": 0,
                    "commentCount": 0,
                    "createdAt": format!("2024-01-01T00:00:{:02}.000000Z", second),
                }),
            )
            .expect("seed post");
    }

    pub async fn doc(&self, collection: &str, id: &str) -> Option<Value> {
        self.store.get(collection, id).await.expect("store get")
    }

    pub async fn counter(&self, collection: &str, id: &str, field: &str) -> i64 {
        self.doc(collection, id)
            .await
            .and_then(|doc| doc.get(field).and_then(Value::as_i64))
            .unwrap_or(0)
    }

    pub fn notifications(&self) -> Vec<Value> {
        self.store.documents("notifications")
    }

    /// 等待所有已发布事件的处理器执行完毕
    pub async fn settle(&self) {
        self.state.events.flush().await;
    }
}
