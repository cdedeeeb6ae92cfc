//! `GET /health`, grounded on the teacher's liveness endpoints (e.g.
//! `ferrex-server`'s `dev_handlers`): no state lookups, just confirms the
//! process is alive and serving.

pub async fn health() -> &'static str {
    "ok"
}
