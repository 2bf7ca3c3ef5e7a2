use super::{collections, Document};
use crate::utils::serde_helpers::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Like,
    Comment,
    Follow,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Follow => "follow",
        }
    }
}

/// 通知记录，只追加；推送成功与否都以它为准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient_user_id: String,
    pub actor_user_id: String,
    pub actor_username: String,
    #[serde(default)]
    pub actor_profile_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_preview: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Document for Notification {
    const COLLECTION: &'static str = collections::NOTIFICATIONS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// 待写入的通知，`createdAt` 由存储分配
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient_user_id: String,
    pub actor_user_id: String,
    pub actor_username: String,
    pub actor_profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_preview: Option<String>,
    pub read: bool,
}

/// 发往推送网关的消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_notification_shape() {
        let doc = serde_json::to_value(NewNotification {
            notification_type: NotificationType::Comment,
            recipient_user_id: "owner".to_string(),
            actor_user_id: "actor".to_string(),
            actor_username: "actor_name".to_string(),
            actor_profile_image_url: None,
            post_id: Some("p1".to_string()),
            comment_id: Some("c1".to_string()),
            comment_preview: Some("nice".to_string()),
            read: false,
        })
        .unwrap();

        assert_eq!(
            doc,
            json!({
                "type": "comment",
                "recipientUserId": "owner",
                "actorUserId": "actor",
                "actorUsername": "actor_name",
                "actorProfileImageUrl": null,
                "postId": "p1",
                "commentId": "c1",
                "commentPreview": "nice",
                "read": false
            })
        );
    }
}
