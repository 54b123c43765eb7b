//! custodia-server - HTTP surface for the chain-of-custody workflow core.
//!
//! The server owns no domain state of its own: every request resolves the
//! acting user from a bearer-token session, dispatches into
//! `custodia-core`, and maps the typed workflow errors onto HTTP status
//! codes. The client-supplied role is never trusted; identity always comes
//! from the server-side session and the user registry.
//!
//! # Modules
//!
//! - [`auth`]: login, bearer-token sessions, actor resolution
//! - [`error`]: `ApiError` with HTTP status mapping
//! - [`handlers`]: request handlers, one per route
//! - [`metrics`]: Prometheus request/transition counters
//! - [`routes`]: router construction
//! - [`state`]: shared application state

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
