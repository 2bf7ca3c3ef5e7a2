use super::{collections, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkiStats {
    #[serde(default)]
    pub resort_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    // 私有字段，永远不出现在列表接口中
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    // 派生计数，只由计数一致性引擎维护
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub following_count: i64,
    #[serde(default)]
    pub ski_stats: SkiStats,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            username: self.username.clone(),
            profile_image_url: self.profile_image_url.clone(),
        }
    }

    /// 可用于推送的设备令牌，空字符串视为没有
    pub fn push_token(&self) -> Option<&str> {
        self.push_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

impl Document for User {
    const COLLECTION: &'static str = collections::USERS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// 列表水合时合并到记录上的公开字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub profile_image_url: Option<String>,
}
