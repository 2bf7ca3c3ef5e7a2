use super::{collections, Document};
use crate::utils::serde_helpers::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Document for Comment {
    const COLLECTION: &'static str = collections::COMMENTS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// 写入存储的新评论，`createdAt` 由存储分配
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: String,
    pub author_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub text: String,
}
