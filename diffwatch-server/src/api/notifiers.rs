//! `GET /verify/{nonce}` — spec.md §6: consumes a notifier confirmation
//! nonce (minted by `users::create_user` when the notifier was provisioned)
//! and marks the notifier verified.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::ApiResult;
use crate::state::AppState;

pub async fn verify(
    State(state): State<AppState>,
    Path(nonce): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let confirmation = state.store.consume_confirmation(nonce).await?;

    let verified = match confirmation {
        Some(confirmation) if confirmation.expiry > Utc::now() => {
            state.store.mark_verified(confirmation.notifier_id).await?;
            true
        }
        _ => false,
    };

    Ok(Json(json!({ "verified": verified })))
}
