//! Subscription management: spec.md §6's
//! `POST/GET /api/users/{user_id}/subscriptions...` surface.
//!
//! `create_subscription` fetches the endpoint once up front (to capture
//! `title`/`image_url` "at subscription time", per the `Subscription` domain
//! comment) and then runs the same insert-snapshot-and-notify steps the
//! scheduler's per-subscription worker does, inline, rather than driving a
//! scheduler pass just to reach the same content a second time. The
//! notifier a new subscription attaches to is the one provisioned for the
//! user at account creation (`users::create_user`), looked up by user id —
//! spec.md's form fields here are `endpoint`, `xpath` only.

use axum::extract::{Path, Query, State};
use axum::Json;
use axum::{http::StatusCode, Form};
use chrono::Utc;
use diffwatch_core::digest::digest;
use diffwatch_core::domain::{Snapshot, Subscription};
use diffwatch_core::store::{NewSnapshot, NewSubscription, Pagination};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionForm {
    pub endpoint: String,
    pub xpath: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionContent {
    pub subscription_id: i64,
    pub content: String,
    pub title: String,
    pub image_url: String,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Form(form): Form<CreateSubscriptionForm>,
) -> ApiResult<(StatusCode, Json<SubscriptionContent>)> {
    if state.store.get_user_by_id(user_id).await?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }
    let notifier = state
        .store
        .get_notifier_for_user(user_id)
        .await?
        .ok_or_else(|| ApiError::internal("user has no notifier"))?;
    if !notifier.verified {
        return Err(ApiError::bad_request("unable to find verified notifier"));
    }
    if form.endpoint.trim().is_empty() || form.xpath.trim().is_empty() {
        return Err(ApiError::bad_request("endpoint and xpath are required"));
    }

    let fetched = state
        .fetcher
        .get_endpoint_content(&form.endpoint, &form.xpath)
        .await?;

    let subscription = state
        .store
        .create_subscription(NewSubscription {
            user_id,
            notifier_id: notifier.id,
            endpoint: form.endpoint,
            xpath: form.xpath,
            title: fetched.title.clone(),
            image_url: fetched.image_url.clone(),
        })
        .await?;

    if fetched.text.is_empty() {
        state
            .store
            .set_no_content_since(subscription.id, Utc::now())
            .await?;
        return Ok((
            StatusCode::OK,
            Json(SubscriptionContent {
                subscription_id: subscription.id,
                content: String::new(),
                title: subscription.title,
                image_url: subscription.image_url,
            }),
        ));
    }

    let now = Utc::now();
    let snapshot = state
        .store
        .insert_snapshot(NewSnapshot {
            timestamp: now,
            user_id,
            subscription_id: subscription.id,
            content: fetched.text.clone(),
            content_digest: digest(&fetched.text),
        })
        .await?;

    if let Ok(sender) = state.senders.get(&notifier.platform) {
        match sender
            .send_snapshot(&notifier, &subscription, None, &snapshot)
            .await
        {
            Ok(_) => {
                let chase_delay = chrono::Duration::from_std(state.config.chase_delay)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                state
                    .store
                    .upsert_chaser(subscription.id, notifier.id, now + chase_delay)
                    .await?;
            }
            Err(error) => {
                tracing::warn!(subscription_id = subscription.id, %error, "initial delivery failed");
            }
        }
    }

    Ok((
        StatusCode::OK,
        Json(SubscriptionContent {
            subscription_id: subscription.id,
            content: fetched.text,
            title: subscription.title,
            image_url: subscription.image_url,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page", rename = "perPage")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    5
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Subscription>>> {
    let page = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let subscriptions = state
        .store
        .list_subscriptions_for_user(user_id, page)
        .await?;
    Ok(Json(subscriptions))
}

#[derive(Debug, Serialize)]
pub struct LatestSnapshot {
    pub subscription_id: i64,
    pub title: String,
    pub image_url: String,
    pub snapshot: Option<Snapshot>,
}

pub async fn latest_subscription(
    State(state): State<AppState>,
    Path((user_id, subscription_id)): Path<(i64, i64)>,
) -> ApiResult<Json<LatestSnapshot>> {
    let subscription = load_owned_subscription(&state, user_id, subscription_id).await?;
    let snapshot = state.store.latest_snapshot(subscription.id).await?;

    Ok(Json(LatestSnapshot {
        subscription_id: subscription.id,
        title: subscription.title,
        image_url: subscription.image_url,
        snapshot,
    }))
}

#[derive(Debug, Serialize)]
pub struct PushResult {
    pub current: Option<Snapshot>,
    pub previous: Option<Snapshot>,
}

pub async fn push_subscription(
    State(state): State<AppState>,
    Path((user_id, subscription_id)): Path<(i64, i64)>,
) -> ApiResult<Json<PushResult>> {
    let subscription = load_owned_subscription(&state, user_id, subscription_id).await?;
    let notifier = state
        .store
        .get_notifier(subscription.notifier_id)
        .await?
        .ok_or_else(|| ApiError::internal("subscription references a missing notifier"))?;

    let current = state.store.latest_snapshot(subscription.id).await?;
    let previous = state.store.previous_snapshot(subscription.id).await?;

    if let Some(current) = &current {
        let sender = state.senders.get(&notifier.platform)?;
        sender
            .send_snapshot(&notifier, &subscription, previous.as_ref(), current)
            .await?;
    }

    Ok(Json(PushResult { current, previous }))
}

async fn load_owned_subscription(
    state: &AppState,
    user_id: i64,
    subscription_id: i64,
) -> ApiResult<Subscription> {
    let subscription = state
        .store
        .get_subscription(subscription_id)
        .await?
        .ok_or_else(|| ApiError::not_found("subscription not found"))?;
    if subscription.user_id != user_id {
        return Err(ApiError::not_found("subscription not found"));
    }
    Ok(subscription)
}
