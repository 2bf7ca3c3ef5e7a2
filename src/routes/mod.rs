pub mod comments;
pub mod events;
pub mod follows;
pub mod likes;
pub mod posts;

use crate::{state::AppState, utils::middleware::request_logging_middleware};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;

/// 构建应用路由 - 使用/api/social/前缀避免网关路由冲突
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(posts::router())
        .merge(comments::router())
        .merge(likes::router())
        .merge(follows::router())
        .merge(events::router());

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api/social", api)
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "photo-social is running!"
}
