use crate::{
    error::Result,
    models::{
        comment::CreateCommentRequest,
        pagination::{ListQuery, PageRequest},
        response::ApiResponse,
    },
    state::AppState,
    utils::middleware::ClientUser,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/posts/:post_id/comments",
            get(get_post_comments).post(create_comment),
        )
        .route("/comments/:comment_id", delete(delete_comment))
}

/// 获取帖子的评论（附带作者公开资料）
/// GET /api/social/posts/:post_id/comments
async fn get_post_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    debug!("Getting comments for post: {}", post_id);

    let request = PageRequest::new(state.page_size(query.limit), query.cursor);
    let page = state
        .comment_service
        .list_post_comments(&post_id, &request)
        .await?;

    Ok(Json(json!(ApiResponse::success(page))))
}

/// 创建评论
/// POST /api/social/posts/:post_id/comments
async fn create_comment(
    State(state): State<Arc<AppState>>,
    ClientUser(user_id): ClientUser,
    Path(post_id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    debug!("User {} commenting on post {}", user_id, post_id);

    let comment = state
        .comment_service
        .create_comment(&user_id, &post_id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!(ApiResponse::success_with_message(
            comment,
            "Comment created successfully"
        ))),
    ))
}

/// 删除评论
/// DELETE /api/social/comments/:comment_id
async fn delete_comment(
    State(state): State<Arc<AppState>>,
    ClientUser(user_id): ClientUser,
    Path(comment_id): Path<String>,
) -> Result<Json<Value>> {
    debug!("User {} deleting comment {}", user_id, comment_id);

    state
        .comment_service
        .delete_comment(&comment_id, &user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Comment deleted successfully"
    })))
}
