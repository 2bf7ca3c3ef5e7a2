use crate::{
    error::{AppError, Result},
    models::{event::DocumentEvent, response::ApiResponse},
    services::events::EventAccepted,
    state::AppState,
};
use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", post(receive_event))
}

/// 接收外部文档变更事件，异步处理
/// POST /api/social/events
async fn receive_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<DocumentEvent>,
) -> Result<(StatusCode, Json<ApiResponse<EventAccepted>>)> {
    if event.kind().is_none() {
        return Err(AppError::bad_request("Event must carry before or after state"));
    }

    let accepted = EventAccepted::from(&event);
    debug!("Accepted {:?} event on {}", accepted.kind, accepted.collection);

    state.events.publish(event);

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(accepted))))
}
