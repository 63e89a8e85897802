//! Blog service routes

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app::{Action, App, ViewState},
    error::{ApiError, ApiResult},
    models::ImageUpload,
    state::AppState,
};

/// Largest accepted header image upload
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Response for session creation
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub state: ViewState,
}

/// Create the router for the blog service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/actions", post(dispatch_action))
        .route(
            "/sessions/:id/uploads/:file_name",
            put(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state)
}

async fn find_session(state: &AppState, id: Uuid) -> ApiResult<std::sync::Arc<App>> {
    state
        .session(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let healthy = state.repository.health_check().await.map_err(|e| {
        error!("Store health check failed: {}", e);
        ApiError::BadGateway("Store unavailable".to_string())
    })?;

    Ok(Json(json!({
        "status": if healthy { "ok" } else { "degraded" },
        "service": "blog-service"
    })))
}

/// Start a client session
pub async fn create_session(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let app = App::start(state.backend(), state.options.clone()).await;
    let snapshot = app.snapshot().await;

    let session_id = state.insert_session(app).await;
    info!("Created session {}", session_id);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            state: snapshot,
        }),
    ))
}

/// Current state of a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let app = find_session(&state, id).await?;
    Ok(Json(app.snapshot().await))
}

/// Run an action in a session
pub async fn dispatch_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(action): Json<Action>,
) -> ApiResult<impl IntoResponse> {
    let app = find_session(&state, id).await?;
    let snapshot = app.dispatch(action).await?;
    Ok(Json(snapshot))
}

/// Upload a header image; the body is the raw image
pub async fn upload_image(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(Uuid, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let app = find_session(&state, id).await?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest(
            "Content-Type must be an image type".to_string(),
        ));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("Image body is empty".to_string()));
    }

    let url = app
        .upload_header_image(ImageUpload {
            file_name,
            content_type,
            bytes: body.to_vec(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

/// End a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if state.remove_session(&id).await {
        info!("Deleted session {}", id);
        Ok(Json(json!({"message": "Session deleted successfully"})))
    } else {
        Err(ApiError::NotFound("Session not found".to_string()))
    }
}
