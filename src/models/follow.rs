use super::{collections, Document};
use crate::utils::serde_helpers::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Follow {
    /// 每个有序 (follower, following) 对最多一条关注记录，
    /// 用确定性 ID 让存储的唯一键来保证这一点
    pub fn edge_id(follower_id: &str, following_id: &str) -> String {
        format!("{}~{}", follower_id, following_id)
    }

    pub fn is_self_follow(&self) -> bool {
        self.follower_id == self.following_id
    }
}

impl Document for Follow {
    const COLLECTION: &'static str = collections::FOLLOWS;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFollow {
    pub follower_id: String,
    pub following_id: String,
}
