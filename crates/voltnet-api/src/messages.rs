use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use voltnet_types::api::{Claims, SendMessageRequest, UnreadCountResponse};
use voltnet_types::models::Message;

use crate::auth::AppStateInner;
use crate::convert::message_from_row;
use crate::error::{ApiResult, run_blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// When present, only the most recent `limit` messages are returned
    /// (still in ascending creation order).
    pub limit: Option<u32>,
}

pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message_id = Uuid::new_v4();

    // Run blocking DB insert off the async runtime
    let db = state.clone();
    let sender = claims.sub.to_string();

    let message: Message = run_blocking(move || {
        let row = db.db.send_message(
            &message_id.to_string(),
            &conversation_id.to_string(),
            &sender,
            &req.body,
        )?;
        Ok(message_from_row(&row))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let requester = claims.sub.to_string();
    let limit = query.limit.map(|n| n.min(200));

    let messages: Vec<Message> = run_blocking(move || {
        let rows = db.db.list_messages(&conversation_id.to_string(), &requester, limit)?;
        Ok(rows.iter().map(message_from_row).collect())
    })
    .await?;

    Ok(Json(messages))
}

/// Read receipt. Repeating the call is a no-op success with the original
/// `read_at` — overlapping poll cycles may both fire it safely.
pub async fn mark_message_read(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let reader = claims.sub.to_string();

    let message: Message = run_blocking(move || {
        let row = db.db.mark_message_read(&message_id.to_string(), &reader)?;
        Ok(message_from_row(&row))
    })
    .await?;

    Ok(Json(message))
}

pub async fn unread_message_count(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    let count = run_blocking(move || db.db.unread_message_count(&viewer)).await?;

    Ok(Json(UnreadCountResponse { count }))
}
