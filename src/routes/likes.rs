use crate::{
    error::Result,
    models::response::ApiResponse,
    state::AppState,
    utils::middleware::ClientUser,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/posts/:post_id/like", post(like_post).delete(unlike_post))
}

/// 点赞帖子
/// POST /api/social/posts/:post_id/like
async fn like_post(
    State(state): State<Arc<AppState>>,
    ClientUser(user_id): ClientUser,
    Path(post_id): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    debug!("User {} liking post {}", user_id, post_id);

    let like = state.like_service.like_post(&user_id, &post_id).await?;

    Ok((StatusCode::CREATED, Json(json!(ApiResponse::success(like)))))
}

/// 取消点赞
/// DELETE /api/social/posts/:post_id/like
async fn unlike_post(
    State(state): State<Arc<AppState>>,
    ClientUser(user_id): ClientUser,
    Path(post_id): Path<String>,
) -> Result<Json<Value>> {
    debug!("User {} unliking post {}", user_id, post_id);

    state.like_service.unlike_post(&user_id, &post_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Like removed successfully"
    })))
}
