use super::{collections, Document};
use crate::utils::serde_helpers::{option_timestamp, timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostLocation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    /// 图片引用：存储路径或下载 URL
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PostLocation>,
    #[serde(default)]
    pub tags: Vec<String>,
    // 派生计数，只由计数一致性引擎维护
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "option_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document for Post {
    const COLLECTION: &'static str = collections::POSTS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// 信息流范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// 所有帖子
    All,
    /// 某个作者的帖子
    Author(String),
    /// 请求者关注的人以及请求者自己的帖子
    Following(String),
}
