mod common;

use common::TestApp;
use photo_social::{
    error::AppError,
    models::{
        comment::CreateCommentRequest,
        event::DocumentEvent,
        pagination::PageRequest,
        post::FeedScope,
    },
    services::idempotency::ProcessingResult,
};
use serde_json::json;

fn comment(text: &str) -> CreateCommentRequest {
    CreateCommentRequest {
        text: text.to_string(),
    }
}

async fn app_with_post() -> TestApp {
    let app = TestApp::new().await;
    app.seed_user("owner", "owner", Some("tok-owner"));
    app.seed_user("alice", "alice", Some("tok-alice"));
    app.seed_user("bob", "bob", None);
    app.seed_post("p1", "owner", &["posts/owner/one.jpg"], 0);
    app
}

#[tokio::test]
async fn test_comment_lifecycle_keeps_count_in_sync() {
    let app = app_with_post().await;
    let comments = &app.state.comment_service;

    let first = comments.create_comment("alice", "p1", comment("great shot")).await.unwrap();
    comments.create_comment("bob", "p1", comment("where is this?")).await.unwrap();
    app.settle().await;
    assert_eq!(app.counter("posts", "p1", "commentCount").await, 2);

    comments.delete_comment(&first.id, "alice").await.unwrap();
    app.settle().await;
    assert_eq!(app.counter("posts", "p1", "commentCount").await, 1);
}

#[tokio::test]
async fn test_only_author_deletes_comment() {
    let app = app_with_post().await;
    let comments = &app.state.comment_service;

    let created = comments.create_comment("alice", "p1", comment("mine")).await.unwrap();
    let err = comments.delete_comment(&created.id, "bob").await.unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(app.doc("comments", &created.id).await.is_some());
}

#[tokio::test]
async fn test_comment_on_missing_post_is_rejected() {
    let app = app_with_post().await;

    let err = app
        .state
        .comment_service
        .create_comment("alice", "missing", comment("hello?"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(app.store.count("comments"), 0);
}

#[tokio::test]
async fn test_comment_notification_preview_is_truncated() {
    let app = app_with_post().await;
    let text = "x".repeat(80);

    app.state.comment_service.create_comment("alice", "p1", comment(&text)).await.unwrap();
    app.settle().await;

    let notifications = app.notifications();
    assert_eq!(notifications.len(), 1);
    let preview = notifications[0]["commentPreview"].as_str().unwrap();
    assert_eq!(preview.chars().count(), 50);
    assert_eq!(preview, format!("{}...", "x".repeat(47)));
    assert_eq!(notifications[0]["recipientUserId"], "owner");
    assert_eq!(notifications[0]["actorUsername"], "alice");

    let sent = app.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "tok-owner");
    assert_eq!(sent[0].body, format!("alice commented: {}", preview));
}

#[tokio::test]
async fn test_no_self_notifications() {
    let app = app_with_post().await;

    app.state.comment_service.create_comment("owner", "p1", comment("my own post")).await.unwrap();
    app.state.like_service.like_post("owner", "p1").await.unwrap();
    app.settle().await;

    assert!(app.notifications().is_empty());
    assert!(app.push.sent().is_empty());
    assert_eq!(app.counter("posts", "p1", "commentCount").await, 1);
    assert_eq!(app.counter("posts", "p1", "likeCount").await, 1);
}

#[tokio::test]
async fn test_like_notifies_author_with_malformed_profile() {
    let app = app_with_post().await;
    app.store
        .seed("users", json!({"id": "legacy", "pushToken": ["not", "a", "string"]}))
        .unwrap();
    app.seed_post("legacy_post", "legacy", &[], 5);

    app.state.like_service.like_post("alice", "legacy_post").await.unwrap();
    app.settle().await;

    let notifications = app.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["recipientUserId"], "legacy");
    assert_eq!(notifications[0]["type"], "like");
    assert!(app.push.sent().is_empty());
    assert_eq!(app.counter("posts", "legacy_post", "likeCount").await, 1);
}

#[tokio::test]
async fn test_like_is_unique_per_user_and_post() {
    let app = app_with_post().await;
    let likes = &app.state.like_service;

    likes.like_post("alice", "p1").await.unwrap();
    let err = likes.like_post("alice", "p1").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    app.settle().await;
    assert_eq!(app.counter("posts", "p1", "likeCount").await, 1);

    likes.unlike_post("alice", "p1").await.unwrap();
    app.settle().await;
    assert_eq!(app.counter("posts", "p1", "likeCount").await, 0);

    // 只有第一次点赞产生通知；推送只在接收者有令牌时发送
    assert_eq!(app.notifications().len(), 1);
    assert_eq!(app.push.sent().len(), 1);
}

#[tokio::test]
async fn test_mutual_follow_counts() {
    let app = app_with_post().await;
    let follows = &app.state.follow_service;

    follows.follow_user("alice", "bob").await.unwrap();
    follows.follow_user("bob", "alice").await.unwrap();
    app.settle().await;

    for user in ["alice", "bob"] {
        assert_eq!(app.counter("users", user, "followerCount").await, 1);
        assert_eq!(app.counter("users", user, "followingCount").await, 1);
    }

    let notifications = app.notifications();
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n["type"] == "follow"));

    // bob 没有推送令牌，只有 alice 收到推送
    let sent = app.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "bob started following you");

    follows.unfollow_user("alice", "bob").await.unwrap();
    app.settle().await;
    assert_eq!(app.counter("users", "bob", "followerCount").await, 0);
    assert_eq!(app.counter("users", "alice", "followingCount").await, 0);
    assert_eq!(app.counter("users", "alice", "followerCount").await, 1);
}

#[tokio::test]
async fn test_refollow_and_relike_restore_counters() {
    let app = app_with_post().await;
    let follows = &app.state.follow_service;
    let likes = &app.state.like_service;

    // 每一步都等事件处理完，确认重建的边不会被当成重复投递
    follows.follow_user("alice", "owner").await.unwrap();
    app.settle().await;
    follows.unfollow_user("alice", "owner").await.unwrap();
    app.settle().await;
    follows.follow_user("alice", "owner").await.unwrap();
    app.settle().await;

    likes.like_post("alice", "p1").await.unwrap();
    app.settle().await;
    likes.unlike_post("alice", "p1").await.unwrap();
    app.settle().await;
    likes.like_post("alice", "p1").await.unwrap();
    app.settle().await;

    assert_eq!(app.counter("users", "owner", "followerCount").await, 1);
    assert_eq!(app.counter("users", "alice", "followingCount").await, 1);
    assert_eq!(app.counter("posts", "p1", "likeCount").await, 1);

    // 每次重新关注、重新点赞都是一次新的通知
    let notifications = app.notifications();
    assert_eq!(notifications.iter().filter(|n| n["type"] == "follow").count(), 2);
    assert_eq!(notifications.iter().filter(|n| n["type"] == "like").count(), 2);
}

#[tokio::test]
async fn test_self_follow_is_ignored() {
    let app = app_with_post().await;

    let err = app.state.follow_service.follow_user("alice", "alice").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // 绕过服务直接写入的自关注记录也不影响计数
    let event = DocumentEvent::created(
        "follows",
        json!({
            "id": "alice~alice",
            "followerId": "alice",
            "followingId": "alice",
            "createdAt": "2024-01-01T00:00:00.000000Z"
        }),
    );
    app.state.events.handle(event).await;

    assert_eq!(app.counter("users", "alice", "followerCount").await, 0);
    assert_eq!(app.counter("users", "alice", "followingCount").await, 0);
    assert!(app.notifications().is_empty());
}

#[tokio::test]
async fn test_redelivered_event_is_applied_once() {
    let app = app_with_post().await;
    let event = DocumentEvent::created(
        "likes",
        json!({
            "id": "alice~p1",
            "userId": "alice",
            "postId": "p1",
            "createdAt": "2024-01-01T00:00:05.000000Z"
        }),
    );

    app.state.events.handle(event.clone()).await;
    let redelivered = app.state.events.handle(event).await;

    assert!(redelivered
        .iter()
        .all(|run| run.result == ProcessingResult::AlreadyProcessed));
    assert_eq!(app.counter("posts", "p1", "likeCount").await, 1);
    assert_eq!(app.notifications().len(), 1);
}

#[tokio::test]
async fn test_delete_post_cascades() {
    let app = app_with_post().await;
    let images = [
        "posts/owner/a.jpg",
        "posts/owner/b.jpg",
        "https://firebasestorage.googleapis.com/v0/b/app/o/posts%2Fowner%2Fc.jpg?alt=media",
    ];
    app.seed_post("p2", "owner", &images, 10);
    for path in [
        "posts/owner/a.jpg",
        "posts/owner/a_thumb_small.jpg",
        "posts/owner/a_thumb_medium.jpg",
        "posts/owner/b.jpg",
        "posts/owner/c.jpg",
    ] {
        app.storage.put(path, vec![1, 2, 3]);
    }

    app.state.comment_service.create_comment("alice", "p2", comment("one")).await.unwrap();
    app.state.comment_service.create_comment("bob", "p2", comment("two")).await.unwrap();
    app.state.like_service.like_post("alice", "p2").await.unwrap();
    app.state.comment_service.create_comment("alice", "p1", comment("other post")).await.unwrap();
    app.settle().await;

    let report = app.state.post_service.delete_post("p2", "owner").await.unwrap();
    app.settle().await;

    assert!(report.completed);
    assert!(report.post_deleted);
    assert_eq!(report.attempted_paths.len(), 9);
    assert_eq!(report.originals_deleted, 3);
    assert_eq!(report.comments_deleted, 2);
    assert_eq!(report.likes_deleted, 1);

    assert!(app.doc("posts", "p2").await.is_none());
    assert!(app.doc("post_deletions", "p2").await.is_none());
    assert_eq!(app.store.count("comments"), 1);
    assert_eq!(app.store.count("likes"), 0);
    assert!(!app.storage.contains("posts/owner/a.jpg"));
    assert!(!app.storage.contains("posts/owner/c.jpg"));
    assert_eq!(app.storage.attempts().len(), 9);

    // 其他帖子不受影响
    assert_eq!(app.counter("posts", "p1", "commentCount").await, 1);
}

#[tokio::test]
async fn test_only_author_deletes_post() {
    let app = app_with_post().await;

    let err = app.state.post_service.delete_post("p1", "alice").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(app.doc("posts", "p1").await.is_some());

    let err = app.state.post_service.delete_post("missing", "owner").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_comment_pages_and_deleted_cursor() {
    let app = app_with_post().await;
    let comments = &app.state.comment_service;

    let mut ids = Vec::new();
    for i in 0..5 {
        let created = comments
            .create_comment("alice", "p1", comment(&format!("comment {}", i)))
            .await
            .unwrap();
        ids.push(created.id);
    }
    app.settle().await;

    let first = comments.list_post_comments("p1", &PageRequest::first(2)).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert!(first.has_more);
    // 最新的在前
    assert_eq!(first.items[0].item.id, ids[4]);
    assert_eq!(first.items[0].profile.as_ref().unwrap().username, "alice");

    let second = comments
        .list_post_comments("p1", &PageRequest::new(2, first.next_cursor.clone()))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 2);
    assert!(second.has_more);

    let third = comments
        .list_post_comments("p1", &PageRequest::new(2, second.next_cursor.clone()))
        .await
        .unwrap();
    assert_eq!(third.items.len(), 1);
    assert!(!third.has_more);
    assert_eq!(third.items[0].item.id, ids[0]);

    // 游标指向的评论被删除后，从第一页重新开始
    let cursor = first.next_cursor.clone().unwrap();
    comments.delete_comment(&cursor, "alice").await.unwrap();
    app.settle().await;

    let restarted = comments
        .list_post_comments("p1", &PageRequest::new(2, Some(cursor)))
        .await
        .unwrap();
    assert_eq!(restarted.items[0].item.id, ids[4]);
}

#[tokio::test]
async fn test_following_feed_includes_own_posts() {
    let app = app_with_post().await;
    app.seed_post("alice_post", "alice", &[], 20);
    app.seed_post("bob_post", "bob", &[], 30);

    app.state.follow_service.follow_user("alice", "owner").await.unwrap();
    app.settle().await;

    let feed = app
        .state
        .post_service
        .get_feed(&FeedScope::Following("alice".to_string()), &PageRequest::first(10))
        .await
        .unwrap();
    let ids: Vec<_> = feed.items.iter().map(|post| post.item.id.as_str()).collect();
    assert_eq!(ids, vec!["alice_post", "p1"]);

    let all = app
        .state
        .post_service
        .get_feed(&FeedScope::All, &PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(all.items.len(), 3);
    assert_eq!(all.items[0].item.id, "bob_post");

    let by_author = app
        .state
        .post_service
        .get_feed(&FeedScope::Author("bob".to_string()), &PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(by_author.items.len(), 1);
    assert_eq!(by_author.items[0].profile.as_ref().unwrap().username, "bob");
}
