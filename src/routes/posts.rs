use crate::{
    error::{AppError, Result},
    models::{pagination::PageRequest, post::FeedScope, response::ApiResponse},
    state::AppState,
    utils::middleware::{ClientUser, OptionalClientUser},
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub following: bool,
}

impl FeedQuery {
    fn scope(&self, viewer: Option<String>) -> Result<FeedScope> {
        match (&self.author, self.following) {
            (Some(_), true) => Err(AppError::bad_request(
                "author and following cannot be combined",
            )),
            (Some(author), false) => Ok(FeedScope::Author(author.clone())),
            (None, true) => viewer
                .map(FeedScope::Following)
                .ok_or_else(|| AppError::bad_request("Missing X-User-Id header")),
            (None, false) => Ok(FeedScope::All),
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feed", get(get_feed))
        .route("/posts/:post_id", delete(delete_post))
}

/// 获取信息流
/// GET /api/social/feed?limit=&cursor=&author=&following=
async fn get_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
    OptionalClientUser(viewer): OptionalClientUser,
) -> Result<Json<Value>> {
    let scope = query.scope(viewer)?;
    debug!("Getting feed: {:?}", scope);

    let request = PageRequest::new(state.page_size(query.limit), query.cursor.clone());
    let page = state.post_service.get_feed(&scope, &request).await?;

    Ok(Json(json!(ApiResponse::success(page))))
}

/// 删除帖子（级联删除评论、点赞和图片）
/// DELETE /api/social/posts/:post_id
async fn delete_post(
    State(state): State<Arc<AppState>>,
    ClientUser(user_id): ClientUser,
    Path(post_id): Path<String>,
) -> Result<Json<Value>> {
    debug!("User {} deleting post {}", user_id, post_id);

    let report = state.post_service.delete_post(&post_id, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": report,
        "message": "Post deleted successfully"
    })))
}
