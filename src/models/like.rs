use super::{collections, Document};
use crate::utils::serde_helpers::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Like {
    /// 每个用户对每个帖子最多点赞一次
    pub fn like_id(user_id: &str, post_id: &str) -> String {
        format!("{}~{}", user_id, post_id)
    }
}

impl Document for Like {
    const COLLECTION: &'static str = collections::LIKES;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLike {
    pub user_id: String,
    pub post_id: String,
}
