use crate::{
    error::Result,
    models::{
        collections,
        comment::Comment,
        follow::Follow,
        like::Like,
        notification::{NewNotification, Notification, NotificationType, PushMessage},
        post::Post,
        user::User,
    },
    services::{database::WriteBatch, idempotency::HandlerOutcome, push::PushGateway, Database},
    utils::validation::{truncate_preview, PREVIEW_MAX_CHARS},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 一条已构造、待写入的通知，以及推送所需的上下文
#[derive(Debug, Clone)]
pub struct PreparedNotification {
    pub id: String,
    pub notification: NewNotification,
    recipient_push_token: Option<String>,
}

impl PreparedNotification {
    fn push_message(&self) -> Option<PushMessage> {
        let token = self.recipient_push_token.clone()?;
        let n = &self.notification;

        let (title, body, data) = match n.notification_type {
            NotificationType::Like => (
                "New like".to_string(),
                format!("{} liked your post", n.actor_username),
                json!({
                    "type": "like",
                    "postId": n.post_id,
                    "notificationId": self.id,
                }),
            ),
            NotificationType::Comment => (
                "New comment".to_string(),
                format!(
                    "{} commented: {}",
                    n.actor_username,
                    n.comment_preview.as_deref().unwrap_or_default()
                ),
                json!({
                    "type": "comment",
                    "postId": n.post_id,
                    "commentId": n.comment_id,
                    "notificationId": self.id,
                }),
            ),
            NotificationType::Follow => (
                "New follower".to_string(),
                format!("{} started following you", n.actor_username),
                json!({
                    "type": "follow",
                    "followerId": n.actor_user_id,
                    "notificationId": self.id,
                }),
            ),
        };

        Some(PushMessage { token, title, body, data })
    }
}

/// 触发通知的社交行为
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    Like(&'a Like),
    Comment(&'a Comment),
    Follow(&'a Follow),
}

impl Subject<'_> {
    fn actor_id(&self) -> &str {
        match self {
            Subject::Like(like) => &like.user_id,
            Subject::Comment(comment) => &comment.author_id,
            Subject::Follow(follow) => &follow.follower_id,
        }
    }

    fn notification_type(&self) -> NotificationType {
        match self {
            Subject::Like(_) => NotificationType::Like,
            Subject::Comment(_) => NotificationType::Comment,
            Subject::Follow(_) => NotificationType::Follow,
        }
    }
}

/// 通知扇出引擎
///
/// 通知记录是唯一可靠的结果；推送只是尽力而为。
/// 任何错误都在这里被记录并吞掉，不会影响触发它的写入。
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
    push: Arc<dyn PushGateway>,
}

impl NotificationService {
    pub async fn new(db: Arc<Database>, push: Arc<dyn PushGateway>) -> Result<Self> {
        Ok(Self { db, push })
    }

    pub async fn notify_like(&self, like: &Like) -> HandlerOutcome {
        self.fan_out(Subject::Like(like)).await
    }

    pub async fn notify_comment(&self, comment: &Comment) -> HandlerOutcome {
        self.fan_out(Subject::Comment(comment)).await
    }

    /// 构造关注通知但不写入，由计数引擎放进关注计数的同一批次
    pub async fn prepare_follow(&self, follow: &Follow) -> Result<Option<PreparedNotification>> {
        self.prepare(Subject::Follow(follow)).await
    }

    pub fn add_to_batch(prepared: &PreparedNotification, batch: &mut WriteBatch) -> Result<()> {
        batch.create(
            collections::NOTIFICATIONS,
            &prepared.id,
            serde_json::to_value(&prepared.notification)?,
        );
        Ok(())
    }

    /// 通知写入之后发送推送；失败只记录日志
    pub async fn deliver_push(&self, prepared: &PreparedNotification) {
        let Some(message) = prepared.push_message() else {
            debug!(
                notification_id = %prepared.id,
                "Recipient has no push token, notification stored only"
            );
            return;
        };

        match self.push.send(&message).await {
            Ok(()) => info!(
                notification_id = %prepared.id,
                recipient = %prepared.notification.recipient_user_id,
                "Push notification sent"
            ),
            Err(e) => warn!(
                notification_id = %prepared.id,
                error = %e,
                "Push delivery failed; notification record kept"
            ),
        }
    }

    async fn fan_out(&self, subject: Subject<'_>) -> HandlerOutcome {
        let kind = subject.notification_type().as_str();
        match self.persist(subject).await {
            Ok(Some(prepared)) => {
                self.deliver_push(&prepared).await;
                HandlerOutcome::Applied
            }
            Ok(None) => HandlerOutcome::Skipped(format!("no {} notification needed", kind)),
            Err(e) => {
                error!(kind = kind, error = %e, "Notification fan-out failed");
                HandlerOutcome::Failed(e.to_string())
            }
        }
    }

    async fn persist(&self, subject: Subject<'_>) -> Result<Option<PreparedNotification>> {
        let Some(prepared) = self.prepare(subject).await? else {
            return Ok(None);
        };

        let stored: Notification = self.db.create(&prepared.id, &prepared.notification).await?;
        info!(
            notification_id = %stored.id,
            kind = stored.notification_type.as_str(),
            recipient = %stored.recipient_user_id,
            "Notification stored"
        );
        Ok(Some(prepared))
    }

    async fn prepare(&self, subject: Subject<'_>) -> Result<Option<PreparedNotification>> {
        let actor_id = subject.actor_id();

        let (recipient_id, post_id, comment_id, comment_preview) = match subject {
            Subject::Like(like) => match self.db.get_by_id::<Post>(&like.post_id).await? {
                Some(post) => (post.author_id, Some(post.id), None, None),
                None => {
                    debug!(post_id = %like.post_id, "Liked post no longer exists");
                    return Ok(None);
                }
            },
            Subject::Comment(comment) => match self.db.get_by_id::<Post>(&comment.post_id).await? {
                Some(post) => (
                    post.author_id,
                    Some(post.id),
                    Some(comment.id.clone()),
                    Some(truncate_preview(&comment.text, PREVIEW_MAX_CHARS)),
                ),
                None => {
                    debug!(post_id = %comment.post_id, "Commented post no longer exists");
                    return Ok(None);
                }
            },
            Subject::Follow(follow) => (follow.following_id.clone(), None, None, None),
        };

        if recipient_id == actor_id {
            debug!(user_id = %actor_id, "Skipping self-triggered notification");
            return Ok(None);
        }

        let Some(actor) = self.db.get_by_id::<User>(actor_id).await? else {
            debug!(user_id = %actor_id, "Actor profile not found");
            return Ok(None);
        };

        // 令牌只影响推送；接收者资料读不出来时照样保存通知
        let recipient_push_token = match self.db.get_by_id::<User>(&recipient_id).await {
            Ok(user) => user.and_then(|user| user.push_token().map(str::to_string)),
            Err(e) => {
                warn!(
                    recipient = %recipient_id,
                    error = %e,
                    "Recipient profile unreadable; storing notification without push"
                );
                None
            }
        };

        Ok(Some(PreparedNotification {
            id: Uuid::new_v4().to_string(),
            notification: NewNotification {
                notification_type: subject.notification_type(),
                recipient_user_id: recipient_id,
                actor_user_id: actor.id.clone(),
                actor_username: actor.username.clone(),
                actor_profile_image_url: actor.profile_image_url.clone(),
                post_id,
                comment_id,
                comment_preview,
                read: false,
            },
            recipient_push_token,
        }))
    }
}
