//! Bearer-token sessions and actor resolution.
//!
//! Login verifies credentials against the identity registry and mints an
//! opaque session token with a configurable TTL. Every other endpoint
//! resolves its actor by token; the user record (and with it the role) is
//! re-read from the registry on each request, so a deactivation takes
//! effect immediately even for live sessions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use custodia_core::identity::User;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

struct Session {
    username: String,
    expires_at: Instant,
}

/// In-memory session store.
///
/// Sessions are an edge concern: losing them on restart only forces a new
/// login, so they deliberately stay out of the durable store.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// Creates a store with the given session TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a session token for a username.
    #[must_use]
    pub fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, s| s.expires_at > Instant::now());
        sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Resolves a token to its username, if the session is still valid.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(token)
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.username.clone())
    }

    /// Drops a session.
    pub fn revoke(&self, token: &str) {
        self.sessions.lock().unwrap().remove(token);
    }
}

/// Extracts the bearer token from request headers.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the acting user for a request.
///
/// # Errors
///
/// Returns `Unauthorized` for a missing/expired token or a deactivated
/// account.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    let username = state.sessions.resolve(token).ok_or(ApiError::Unauthorized)?;
    let user = state
        .registry
        .get_by_username(&username)
        .map_err(|_| ApiError::Unauthorized)?;
    if !user.active {
        return Err(ApiError::Unauthorized);
    }
    Ok(user)
}
