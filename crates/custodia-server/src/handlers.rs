//! Request handlers.
//!
//! Handlers are thin: resolve the actor, dispatch into the core, map the
//! result. Authorization for workflow transitions happens inside the core
//! workflows; the handful of server-surface actions (audit reads, user and
//! location management) consult the same gate here before dispatching.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use custodia_core::authz::{self, Action, Decision, DenyReason, ResourceContext};
use custodia_core::custody::{ChainVerification, CustodyEvent, EventFilter};
use custodia_core::destruction::{DestructionRequest, NewDestructionRequest};
use custodia_core::identity::{NewUser, User};
use custodia_core::item::{Item, Location, NewItem, NewLocation};
use custodia_core::transfer::{NewTransferRequest, TransferRequest};
use custodia_core::WorkflowError;
use serde::{Deserialize, Serialize};

use crate::auth::{authenticate, bearer_token};
use crate::error::ApiError;
use crate::state::AppState;

/// Stable metric label for a deny reason.
const fn deny_label(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::RoleNotPermitted => "role_not_permitted",
        DenyReason::SelfApprovalForbidden => "self_approval_forbidden",
        DenyReason::ResourceNotInRequiredState => "resource_not_in_required_state",
    }
}

/// Maps a core error onto the API error, counting denials as they pass.
fn map_core(state: &AppState, err: WorkflowError) -> ApiError {
    if let WorkflowError::Denied(reason) = &err {
        state.metrics.denial(deny_label(*reason));
    }
    ApiError::Workflow(err)
}

/// Server-surface gate check for non-workflow actions.
fn require(state: &AppState, actor: &User, action: Action) -> Result<(), ApiError> {
    match authz::authorize(actor, action, &ResourceContext::none()) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            state.metrics.denial(deny_label(reason));
            Err(ApiError::Workflow(WorkflowError::Denied(reason)))
        },
    }
}

// ---------------------------------------------------------------------------
// auth

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Login response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Opaque bearer token.
    pub token: String,
    /// Login name.
    pub username: String,
    /// Human-readable name.
    pub display_name: String,
    /// The account's role, resolved server-side.
    pub role: custodia_core::Role,
    /// Whether the external MFA collaborator should run its step.
    pub mfa_enabled: bool,
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .registry
        .verify_login(&body.username, &body.password)
        .map_err(|err| match err {
            WorkflowError::Validation(_) => ApiError::Unauthorized,
            other => map_core(&state, other),
        })?;
    let token = state.sessions.create(&user.username);
    tracing::info!(username = %user.username, "login");
    Ok(Json(LoginResponse {
        token,
        username: user.username,
        display_name: user.display_name,
        role: user.role,
        mfa_enabled: user.mfa_enabled,
    }))
}

/// `GET /auth/me`
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let user = authenticate(&state, &headers)?;
    Ok(Json(user))
}

/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token);
    }
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// seizures

/// `POST /seizures`
pub async fn register_seizure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewItem>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    let item = state
        .ledger
        .register_item(&actor, &body)
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("ledger", "register");
    Ok((StatusCode::CREATED, Json(item)))
}

/// `GET /seizures`
pub async fn list_seizures(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Item>>, ApiError> {
    authenticate(&state, &headers)?;
    let items = state.ledger.list_items().map_err(|err| map_core(&state, err))?;
    Ok(Json(items))
}

/// `GET /seizures/{code}`
pub async fn get_seizure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<Item>, ApiError> {
    authenticate(&state, &headers)?;
    let item = state.ledger.get_item(&code).map_err(|err| map_core(&state, err))?;
    Ok(Json(item))
}

// ---------------------------------------------------------------------------
// custody log

/// `GET /items/{code}/custody-events`
pub async fn item_custody_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<Vec<CustodyEvent>>, ApiError> {
    authenticate(&state, &headers)?;
    let events = state
        .log
        .events_for_item(&code)
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(events))
}

/// `GET /items/{code}/custody-verify`
pub async fn item_custody_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<ChainVerification>, ApiError> {
    authenticate(&state, &headers)?;
    let verification = state
        .log
        .verify_chain(&code)
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(verification))
}

/// Query parameters for the audit listing.
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    /// Only events for this item.
    pub item_code: Option<String>,
    /// Only events by this actor.
    pub actor: Option<String>,
    /// Maximum number of events.
    #[serde(default)]
    pub limit: u64,
}

/// `GET /audit/events`
pub async fn audit_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<CustodyEvent>>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    require(&state, &actor, Action::ViewAuditLog)?;
    let events = state
        .log
        .query(&EventFilter {
            item_code: query.item_code,
            actor: query.actor,
            limit: query.limit,
        })
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(events))
}

// ---------------------------------------------------------------------------
// transfers

/// Decision body for transfer approve/reject.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    /// Free-text notes recorded on the custody event.
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /transfers`
pub async fn create_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewTransferRequest>,
) -> Result<(StatusCode, Json<TransferRequest>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .transfers
        .request(&actor, &body)
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("transfer", "request");
    Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /transfers`
pub async fn list_transfers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TransferRequest>>, ApiError> {
    authenticate(&state, &headers)?;
    let requests = state.transfers.list().map_err(|err| map_core(&state, err))?;
    Ok(Json(requests))
}

/// `GET /transfers/{id}`
pub async fn get_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TransferRequest>, ApiError> {
    authenticate(&state, &headers)?;
    let request = state.transfers.get(&id).map_err(|err| map_core(&state, err))?;
    Ok(Json(request))
}

/// `POST /transfers/{id}/approve`
pub async fn approve_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<TransferRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .transfers
        .approve(&actor, &id, body.notes.as_deref())
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("transfer", "approve");
    Ok(Json(request))
}

/// `POST /transfers/{id}/reject`
pub async fn reject_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<TransferRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .transfers
        .reject(&actor, &id, body.notes.as_deref())
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("transfer", "reject");
    Ok(Json(request))
}

/// `POST /transfers/{id}/receive`
pub async fn receive_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TransferRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .transfers
        .receive(&actor, &id)
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("transfer", "receive");
    Ok(Json(request))
}

// ---------------------------------------------------------------------------
// destruction

/// Decision body for a destruction approval level.
#[derive(Debug, Deserialize)]
pub struct LevelDecisionBody {
    /// The approval level being decided.
    pub level: u32,
    /// Free-text notes recorded on the decision and custody events.
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /destruction-requests`
pub async fn create_destruction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewDestructionRequest>,
) -> Result<(StatusCode, Json<DestructionRequest>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .destructions
        .create(&actor, &body)
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("destruction", "create");
    Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /destruction-requests`
pub async fn list_destructions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DestructionRequest>>, ApiError> {
    authenticate(&state, &headers)?;
    let requests = state
        .destructions
        .list()
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(requests))
}

/// `GET /destruction-requests/{id}`
pub async fn get_destruction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DestructionRequest>, ApiError> {
    authenticate(&state, &headers)?;
    let request = state
        .destructions
        .get(&id)
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(request))
}

/// `POST /destruction-requests/{id}/submit`
pub async fn submit_destruction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DestructionRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .destructions
        .submit(&actor, &id)
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("destruction", "submit");
    Ok(Json(request))
}

/// `POST /destruction-requests/{id}/approve`
pub async fn approve_destruction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<LevelDecisionBody>,
) -> Result<Json<DestructionRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .destructions
        .approve(&actor, &id, body.level, body.notes.as_deref())
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("destruction", "approve");
    Ok(Json(request))
}

/// `POST /destruction-requests/{id}/reject`
pub async fn reject_destruction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<LevelDecisionBody>,
) -> Result<Json<DestructionRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .destructions
        .reject(&actor, &id, body.level, body.notes.as_deref())
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("destruction", "reject");
    Ok(Json(request))
}

/// `POST /destruction-requests/{id}/execute`
pub async fn execute_destruction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DestructionRequest>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = state
        .destructions
        .execute(&actor, &id)
        .map_err(|err| map_core(&state, err))?;
    state.metrics.transition("destruction", "execute");
    Ok(Json(request))
}

// ---------------------------------------------------------------------------
// inventory

/// Location with its current contents.
#[derive(Debug, Serialize)]
pub struct LocationDetail {
    /// The location.
    pub location: Location,
    /// Items currently in custody here.
    pub items: Vec<Item>,
}

/// `GET /inventory/locations`
pub async fn list_locations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Location>>, ApiError> {
    authenticate(&state, &headers)?;
    let locations = state
        .ledger
        .list_locations()
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(locations))
}

/// `GET /inventory/locations/{id}`
pub async fn location_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<LocationDetail>, ApiError> {
    authenticate(&state, &headers)?;
    let (location, items) = state
        .ledger
        .location_detail(&id)
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(LocationDetail { location, items }))
}

/// `POST /inventory/locations`
pub async fn create_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewLocation>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    require(&state, &actor, Action::ManageLocations)?;
    let location = state
        .ledger
        .add_location(&body)
        .map_err(|err| map_core(&state, err))?;
    Ok((StatusCode::CREATED, Json(location)))
}

// ---------------------------------------------------------------------------
// users

/// `GET /users`
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    require(&state, &actor, Action::ManageUsers)?;
    let users = state.registry.list_users().map_err(|err| map_core(&state, err))?;
    Ok(Json(users))
}

/// `POST /users`
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    require(&state, &actor, Action::ManageUsers)?;
    let user = state
        .registry
        .create_user(&body)
        .map_err(|err| map_core(&state, err))?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /users/{id}/deactivate`
pub async fn deactivate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    require(&state, &actor, Action::ManageUsers)?;
    let user = state
        .registry
        .deactivate(&id)
        .map_err(|err| map_core(&state, err))?;
    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// ops

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .encode_text()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
