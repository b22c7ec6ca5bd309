use std::collections::HashMap;
use std::sync::Arc;

use axum::{Extension, Json, extract::Path, extract::State, response::IntoResponse};
use uuid::Uuid;

use voltnet_db::Database;
use voltnet_types::api::{Claims, MarkAllReadResponse, NotificationResponse, UnreadCountResponse};
use voltnet_types::models::{NotificationKind, Profile};

use crate::auth::AppStateInner;
use crate::convert::{parse_timestamp, parse_uuid, profile_from_user};
use crate::error::{ApiResult, run_blocking};

pub async fn list_notifications(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    let responses = run_blocking(move || {
        let rows = db.db.list_notifications(&viewer)?;

        // Read-through actor resolution shared across the batch: one profile
        // fetch per distinct actor, not one per notification.
        let mut actors: HashMap<String, Option<Profile>> = HashMap::new();

        let mut responses = Vec::with_capacity(rows.len());
        for row in rows {
            let actor = match &row.actor_id {
                Some(actor_id) => resolve_actor(&db.db, &mut actors, actor_id)?,
                None => None,
            };

            responses.push(NotificationResponse {
                id: parse_uuid(&row.id, "notification id"),
                kind: NotificationKind::parse(&row.kind).unwrap_or(NotificationKind::NewPost),
                actor,
                target_type: row.target_type.clone(),
                target_id: row.target_id.as_deref().map(|t| parse_uuid(t, "target_id")),
                is_read: row.is_read,
                created_at: parse_timestamp(&row.created_at, "notification created_at"),
            });
        }
        Ok(responses)
    })
    .await?;

    Ok(Json(responses))
}

fn resolve_actor(
    db: &Database,
    cache: &mut HashMap<String, Option<Profile>>,
    actor_id: &str,
) -> Result<Option<Profile>, voltnet_db::StoreError> {
    if let Some(hit) = cache.get(actor_id) {
        return Ok(hit.clone());
    }
    let profile = db.get_user_by_id(actor_id)?.map(|u| profile_from_user(&u));
    cache.insert(actor_id.to_string(), profile.clone());
    Ok(profile)
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppStateInner>>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    run_blocking(move || db.db.mark_notification_read(&notification_id.to_string(), &viewer))
        .await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    let marked = run_blocking(move || db.db.mark_all_notifications_read(&viewer)).await?;

    Ok(Json(MarkAllReadResponse { marked }))
}

pub async fn unread_notification_count(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let viewer = claims.sub.to_string();

    let count = run_blocking(move || db.db.unread_notification_count(&viewer)).await?;

    Ok(Json(UnreadCountResponse { count }))
}
