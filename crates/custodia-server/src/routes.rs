//! Router construction.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Counts every served request by matched route template and status.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let response = next.run(request).await;
    state
        .metrics
        .request_served(&endpoint, response.status().as_u16());
    response
}

/// Builds the full application router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
        .route(
            "/seizures",
            get(handlers::list_seizures).post(handlers::register_seizure),
        )
        .route("/seizures/:code", get(handlers::get_seizure))
        .route(
            "/items/:code/custody-events",
            get(handlers::item_custody_events),
        )
        .route(
            "/items/:code/custody-verify",
            get(handlers::item_custody_verify),
        )
        .route("/audit/events", get(handlers::audit_events))
        .route(
            "/transfers",
            get(handlers::list_transfers).post(handlers::create_transfer),
        )
        .route("/transfers/:id", get(handlers::get_transfer))
        .route("/transfers/:id/approve", post(handlers::approve_transfer))
        .route("/transfers/:id/reject", post(handlers::reject_transfer))
        .route("/transfers/:id/receive", post(handlers::receive_transfer))
        .route(
            "/destruction-requests",
            get(handlers::list_destructions).post(handlers::create_destruction),
        )
        .route("/destruction-requests/:id", get(handlers::get_destruction))
        .route(
            "/destruction-requests/:id/submit",
            post(handlers::submit_destruction),
        )
        .route(
            "/destruction-requests/:id/approve",
            post(handlers::approve_destruction),
        )
        .route(
            "/destruction-requests/:id/reject",
            post(handlers::reject_destruction),
        )
        .route(
            "/destruction-requests/:id/execute",
            post(handlers::execute_destruction),
        )
        .route(
            "/inventory/locations",
            get(handlers::list_locations).post(handlers::create_location),
        )
        .route(
            "/inventory/locations/:id",
            get(handlers::location_detail),
        )
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/users/:id/deactivate", post(handlers::deactivate_user))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
}
