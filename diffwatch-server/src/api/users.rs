//! `POST /api/users` — spec.md §6: form fields `email`, `password` → 202
//! with user JSON. Grounded on the teacher's registration handler shape
//! (`ferrex_server::users::user_handlers::register`): hash the credential,
//! persist, return the created row serialized (the hash is skipped by
//! `#[serde(skip_serializing)]` on `User::password_credential`).
//!
//! Account creation also provisions the user's sole notifier (platform
//! `"email"`, identifier the account's own email) and mails a verification
//! link for it: a subscription always has exactly one notifier to attach
//! to, so there is no separate notifier-creation endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Form, Json};
use chrono::{Duration, Utc};
use diffwatch_core::domain::User;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ApiError, ApiResult};
use crate::password;
use crate::state::AppState;

/// Confirmations expire after three days, matching the onboarding flow's
/// nonce lifetime. Unconfirmed notifiers stay `verified = false`
/// indefinitely and simply never receive deliveries.
const CONFIRMATION_TTL: Duration = Duration::days(3);

#[derive(Debug, Deserialize)]
pub struct CreateUserForm {
    pub email: String,
    pub password: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Form(form): Form<CreateUserForm>,
) -> ApiResult<(StatusCode, Json<User>)> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let hashed = password::hash(&form.password)?;
    let user = state.store.create_user(&form.email, &hashed).await?;

    let notifier = state
        .store
        .create_notifier(user.id, "email", &form.email)
        .await?;

    let nonce = Uuid::new_v4();
    let expiry = Utc::now() + CONFIRMATION_TTL;
    state
        .store
        .create_confirmation(notifier.id, nonce, expiry)
        .await?;

    let verify_url = format!("{}/verify/{}", state.config.server_dns, nonce);
    if let Ok(sender) = state.senders.get(&notifier.platform) {
        if let Err(error) = sender.send_verification(&notifier, &verify_url).await {
            tracing::warn!(notifier_id = notifier.id, %error, "failed to send verification");
        }
    }

    Ok((StatusCode::ACCEPTED, Json(user)))
}
