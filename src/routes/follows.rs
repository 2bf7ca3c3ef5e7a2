use crate::{
    error::Result,
    models::{
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
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/:user_id/follow", post(follow_user).delete(unfollow_user))
        .route("/users/:user_id/followers", get(get_followers))
        .route("/users/:user_id/following", get(get_following))
}

/// 关注用户
/// POST /api/social/users/:user_id/follow
async fn follow_user(
    State(state): State<Arc<AppState>>,
    ClientUser(follower_id): ClientUser,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    debug!("User {} following user {}", follower_id, user_id);

    let follow = state
        .follow_service
        .follow_user(&follower_id, &user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!(ApiResponse::success_with_message(
            follow,
            "User followed successfully"
        ))),
    ))
}

/// 取消关注用户
/// DELETE /api/social/users/:user_id/follow
async fn unfollow_user(
    State(state): State<Arc<AppState>>,
    ClientUser(follower_id): ClientUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    debug!("User {} unfollowing user {}", follower_id, user_id);

    state
        .follow_service
        .unfollow_user(&follower_id, &user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "User unfollowed successfully"
    })))
}

/// 获取用户的关注者列表
/// GET /api/social/users/:user_id/followers
async fn get_followers(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    debug!("Getting followers for user: {}", user_id);

    let request = PageRequest::new(state.page_size(query.limit), query.cursor);
    let followers = state.follow_service.get_followers(&user_id, &request).await?;

    Ok(Json(json!(ApiResponse::success(followers))))
}

/// 获取用户关注的人列表
/// GET /api/social/users/:user_id/following
async fn get_following(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    debug!("Getting following for user: {}", user_id);

    let request = PageRequest::new(state.page_size(query.limit), query.cursor);
    let following = state.follow_service.get_following(&user_id, &request).await?;

    Ok(Json(json!(ApiResponse::success(following))))
}
