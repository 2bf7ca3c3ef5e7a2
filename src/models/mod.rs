pub mod comment;
pub mod deletion;
pub mod event;
pub mod follow;
pub mod like;
pub mod notification;
pub mod pagination;
pub mod post;
pub mod response;
pub mod user;

use crate::error::{AppError, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// 集合名称
pub mod collections {
    pub const POSTS: &str = "posts";
    pub const COMMENTS: &str = "comments";
    pub const FOLLOWS: &str = "follows";
    pub const LIKES: &str = "likes";
    pub const USERS: &str = "users";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const PROCESSED_EVENTS: &str = "processed_events";
    pub const POST_DELETIONS: &str = "post_deletions";
}

/// 存储在某个集合中的强类型文档
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

/// 在边界处把原始文档解码为强类型实体，缺少必填字段的文档会被拒绝
pub fn decode<T: Document>(doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| AppError::invalid_document(T::COLLECTION, e))
}
