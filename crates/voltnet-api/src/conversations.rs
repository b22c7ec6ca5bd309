use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use voltnet_db::{Database, StoreError};
use voltnet_types::api::{
    Claims, ConversationResponse, ConversationSummary, CreateConversationRequest,
};
use voltnet_types::models::Profile;

use crate::auth::AppStateInner;
use crate::convert::{message_from_row, parse_timestamp, profile_from_user};
use crate::error::{ApiResult, run_blocking};

/// Idempotent create: 201 when a new conversation row was inserted, 200 when
/// the pair already had one (both concurrent callers see the same id).
pub async fn create_conversation(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let candidate_id = Uuid::new_v4();

    let db = state.clone();
    let requester = claims.sub.to_string();
    let participant = req.participant_id.to_string();

    let (response, created) = run_blocking(move || {
        let (row, created) =
            db.db
                .create_conversation(&candidate_id.to_string(), &requester, &participant)?;
        let counterpart = counterpart_profile(&db.db, &row, &requester)?;
        Ok((
            ConversationResponse {
                id: row.id.parse().unwrap_or(candidate_id),
                counterpart,
                created_at: parse_timestamp(&row.created_at, "conversation created_at"),
            },
            created,
        ))
    })
    .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(response)))
}

pub async fn list_conversations(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    let summaries = run_blocking(move || {
        let rows = db.db.list_conversations(&viewer)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let counterpart = counterpart_profile(&db.db, &row, &viewer)?;

            // Preview: tail fetch of the single most recent message.
            let last_message = db
                .db
                .list_messages(&row.id, &viewer, Some(1))?
                .pop()
                .map(|m| message_from_row(&m));
            let unread_count = db.db.unread_count_in_conversation(&row.id, &viewer)?;

            summaries.push(ConversationSummary {
                id: crate::convert::parse_uuid(&row.id, "conversation id"),
                counterpart,
                last_message,
                unread_count,
                created_at: parse_timestamp(&row.created_at, "conversation created_at"),
            });
        }
        Ok(summaries)
    })
    .await?;

    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let requester = claims.sub.to_string();

    let response = run_blocking(move || {
        let row = db.db.get_conversation(&conversation_id.to_string(), &requester)?;
        let counterpart = counterpart_profile(&db.db, &row, &requester)?;
        Ok(ConversationResponse {
            id: conversation_id,
            counterpart,
            created_at: parse_timestamp(&row.created_at, "conversation created_at"),
        })
    })
    .await?;

    Ok(Json(response))
}

/// Resolve the "other side" of a conversation row to a display identity.
fn counterpart_profile(
    db: &Database,
    row: &voltnet_db::models::ConversationRow,
    viewer: &str,
) -> Result<Profile, StoreError> {
    let counterpart_id = if row.participant_a == viewer {
        &row.participant_b
    } else {
        &row.participant_a
    };

    let user = db.get_user_by_id(counterpart_id)?.ok_or(StoreError::NotFound)?;
    Ok(profile_from_user(&user))
}
