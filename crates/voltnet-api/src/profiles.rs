use std::sync::Arc;

use axum::{Extension, Json, extract::Path, extract::State, response::IntoResponse};
use uuid::Uuid;

use voltnet_db::StoreError;
use voltnet_types::api::Claims;

use crate::auth::AppStateInner;
use crate::convert::profile_from_user;
use crate::error::{ApiResult, run_blocking};

/// Identity lookup consumed by the client's read-through profile cache.
pub async fn get_profile(
    State(state): State<Arc<AppStateInner>>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();

    let profile = run_blocking(move || {
        let user = db
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(StoreError::NotFound)?;
        Ok(profile_from_user(&user))
    })
    .await?;

    Ok(Json(profile))
}
