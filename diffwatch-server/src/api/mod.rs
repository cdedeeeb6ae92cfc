//! Router assembly, grounded on the teacher's `main.rs` route wiring: one
//! `Router` built from per-resource handler modules, `basic_auth` layered
//! over the authenticated surface only, `/health` and `/verify` left open.

mod health;
mod notifiers;
mod subscriptions;
mod users;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::basic_auth;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/users", post(users::create_user))
        .route(
            "/users/:user_id/subscriptions",
            post(subscriptions::create_subscription).get(subscriptions::list_subscriptions),
        )
        .route(
            "/users/:user_id/subscriptions/:subscription_id/latest",
            get(subscriptions::latest_subscription),
        )
        .route(
            "/users/:user_id/subscriptions/:subscription_id/push",
            post(subscriptions::push_subscription),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/verify/:nonce", get(notifiers::verify))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
