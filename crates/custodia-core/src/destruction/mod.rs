//! Destruction request workflow.
//!
//! State machine per request: `Draft --submit--> PendingApproval --(all
//! levels approved)--> Approved --execute--> Completed`; a rejection at any
//! level is terminal. Approval levels come from configuration and must be
//! granted strictly in ascending order by distinct approvers; execution
//! re-checks every item and the witness minimum before anything burns.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::{self, Action, Decision, DenyReason, ResourceContext};
use crate::config::DestructionConfig;
use crate::custody::{self, CustodyAction, NewCustodyEvent};
use crate::error::WorkflowError;
use crate::identity::{Role, User};
use crate::item::ItemStatus;
use crate::store::Store;

/// State of a destruction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructionState {
    /// Being assembled; not yet visible to approvers.
    Draft,
    /// Submitted and collecting approvals.
    PendingApproval,
    /// Every level approved; awaiting execution.
    Approved,
    /// Executed. Terminal.
    Completed,
    /// Rejected at some level. Terminal.
    Rejected,
}

impl DestructionState {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "pending_approval" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// True for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

/// Enumerated disposal method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructionMethod {
    /// High-temperature incineration.
    Incineration,
    /// Chemical neutralization.
    ChemicalNeutralization,
    /// Mechanical crushing.
    Crushing,
    /// Secure burial.
    Burial,
    /// Anything else; describe it in the legal reason.
    Other,
}

impl DestructionMethod {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incineration => "incineration",
            Self::ChemicalNeutralization => "chemical_neutralization",
            Self::Crushing => "crushing",
            Self::Burial => "burial",
            Self::Other => "other",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incineration" => Some(Self::Incineration),
            "chemical_neutralization" => Some(Self::ChemicalNeutralization),
            "crushing" => Some(Self::Crushing),
            "burial" => Some(Self::Burial),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Status of one approval level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Not yet decided.
    Pending,
    /// Granted.
    Approved,
    /// Refused; terminal for the whole request.
    Rejected,
}

impl ApprovalStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One required approval level on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalLevel {
    /// Level number, 1-based.
    pub level: u32,
    /// Role required to decide this level.
    pub required_role: Role,
    /// Decision status.
    pub status: ApprovalStatus,
    /// Username of the decider, once decided.
    pub approver: Option<String>,
    /// When the level was decided.
    pub decided_at: Option<DateTime<Utc>>,
    /// Decision notes.
    pub notes: Option<String>,
}

/// A destruction witness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Witness {
    /// Witness name.
    pub name: String,
    /// Witness role or title, free text.
    pub role: String,
}

/// A destruction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestructionRequest {
    /// Request id.
    pub id: String,
    /// Items slated for destruction.
    pub item_codes: Vec<String>,
    /// Username of the requester.
    pub requested_by: String,
    /// When the request was created.
    pub requested_at: DateTime<Utc>,
    /// Disposal method.
    pub method: DestructionMethod,
    /// Planned execution date.
    pub scheduled_date: Option<NaiveDate>,
    /// Legal justification.
    pub legal_reason: String,
    /// Current state.
    pub state: DestructionState,
    /// Ordered approval levels.
    pub approvals: Vec<ApprovalLevel>,
    /// Witnesses to the destruction.
    pub witnesses: Vec<Witness>,
    /// Username of the executor, once completed.
    pub executed_by: Option<String>,
    /// When the request was executed.
    pub executed_at: Option<DateTime<Utc>>,
}

/// Input for creating a destruction request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDestructionRequest {
    /// Items slated for destruction.
    pub item_codes: Vec<String>,
    /// Disposal method.
    pub method: DestructionMethod,
    /// Planned execution date.
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    /// Legal justification.
    pub legal_reason: String,
    /// Witnesses to the destruction.
    #[serde(default)]
    pub witnesses: Vec<Witness>,
}

/// The destruction workflow.
///
/// The approval-level ladder and witness minimum come from
/// [`DestructionConfig`], not from code.
pub struct DestructionWorkflow {
    store: Arc<Store>,
    policy: DestructionConfig,
}

impl DestructionWorkflow {
    /// Creates a workflow over the shared store with the given policy.
    #[must_use]
    pub fn new(store: Arc<Store>, policy: DestructionConfig) -> Self {
        Self { store, policy }
    }

    /// Creates a request in `Draft`.
    ///
    /// Every item must currently be in storage and not already part of
    /// another active destruction request. Item statuses are untouched
    /// until [`DestructionWorkflow::submit`].
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses or an item is not in a destroyable
    /// state, `NotFound` for unknown items, `Validation` for malformed
    /// input.
    pub fn create(
        &self,
        actor: &User,
        new: &NewDestructionRequest,
    ) -> Result<DestructionRequest, WorkflowError> {
        if let Decision::Deny(reason) =
            authz::authorize(actor, Action::RequestDestruction, &ResourceContext::none())
        {
            return Err(WorkflowError::Denied(reason));
        }
        if new.item_codes.is_empty() {
            return Err(WorkflowError::Validation(
                "at least one item is required".into(),
            ));
        }
        let unique: HashSet<&str> = new.item_codes.iter().map(String::as_str).collect();
        if unique.len() != new.item_codes.len() {
            return Err(WorkflowError::Validation("duplicate item codes".into()));
        }
        if new.legal_reason.trim().is_empty() {
            return Err(WorkflowError::Validation("a legal reason is required".into()));
        }

        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            for code in &new.item_codes {
                let item = txn
                    .get_item(code)?
                    .ok_or_else(|| WorkflowError::not_found("item", code))?;
                if !matches!(
                    item.status,
                    ItemStatus::InStorage | ItemStatus::PendingDestruction
                ) {
                    return Err(WorkflowError::Denied(
                        DenyReason::ResourceNotInRequiredState,
                    ));
                }
                if txn.item_in_active_destruction(code)? {
                    return Err(WorkflowError::Validation(format!(
                        "item {code} is already part of an active destruction request"
                    )));
                }
            }

            let request = DestructionRequest {
                id: Uuid::new_v4().to_string(),
                item_codes: new.item_codes.clone(),
                requested_by: actor.username.clone(),
                requested_at: now,
                method: new.method,
                scheduled_date: new.scheduled_date,
                legal_reason: new.legal_reason.clone(),
                state: DestructionState::Draft,
                approvals: self
                    .policy
                    .approval_levels
                    .iter()
                    .map(|level| ApprovalLevel {
                        level: level.level,
                        required_role: level.role,
                        status: ApprovalStatus::Pending,
                        approver: None,
                        decided_at: None,
                        notes: None,
                    })
                    .collect(),
                witnesses: new.witnesses.clone(),
                executed_by: None,
                executed_at: None,
            };
            txn.insert_destruction(&request)?;

            tracing::info!(
                request = %request.id,
                items = request.item_codes.len(),
                method = %request.method.as_str(),
                actor = %actor.username,
                "destruction request drafted"
            );
            Ok(request)
        })
    }

    /// Submits a draft for approval.
    ///
    /// Checks the witness minimum, moves every item `InStorage ->
    /// PendingDestruction` via compare-and-swap, and appends a
    /// `destruction_request` custody event per item.
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses, `NotFound` for an unknown request,
    /// `InvalidState` unless the request is a draft, `Validation` when
    /// witnesses are missing, `Conflict` when an item moved concurrently.
    pub fn submit(&self, actor: &User, request_id: &str) -> Result<DestructionRequest, WorkflowError> {
        if let Decision::Deny(reason) =
            authz::authorize(actor, Action::RequestDestruction, &ResourceContext::none())
        {
            return Err(WorkflowError::Denied(reason));
        }

        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_destruction(request_id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))?;

            if request.state != DestructionState::Draft {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is {}, expected draft",
                    request.id,
                    request.state.as_str()
                )));
            }
            if request.witnesses.len() < self.policy.min_witnesses {
                return Err(WorkflowError::Validation(format!(
                    "at least {} witnesses are required, got {}",
                    self.policy.min_witnesses,
                    request.witnesses.len()
                )));
            }

            for code in &request.item_codes {
                if !txn.update_custody_status_only(code, ItemStatus::PendingDestruction, ItemStatus::InStorage)? {
                    return Err(WorkflowError::Conflict { code: code.clone() });
                }
            }
            if !txn.update_destruction_state(
                &request.id,
                DestructionState::Draft,
                DestructionState::PendingApproval,
            )? {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is no longer a draft",
                    request.id
                )));
            }
            for code in &request.item_codes {
                txn.append_event(
                    &NewCustodyEvent {
                        item_code: code.clone(),
                        action: CustodyAction::DestructionRequest,
                        actor: actor.username.clone(),
                        from_location: None,
                        to_location: None,
                        notes: Some(request.legal_reason.clone()),
                    },
                    now,
                )?;
            }

            tracing::info!(request = %request.id, actor = %actor.username, "destruction request submitted");
            txn.get_destruction(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))
        })
    }

    /// Approves one level.
    ///
    /// Levels must be granted strictly in ascending order; each level needs
    /// the configured role (the static capability table still applies), a
    /// distinct approver, and never the requester.
    ///
    /// # Errors
    ///
    /// `Denied` for gate refusals, the requester, a repeat approver, or a
    /// role below the level's requirement; `OutOfOrderApproval` when an
    /// earlier level is still pending; `InvalidState` when the level or
    /// request is already decided.
    pub fn approve(
        &self,
        actor: &User,
        request_id: &str,
        level: u32,
        notes: Option<&str>,
    ) -> Result<DestructionRequest, WorkflowError> {
        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_destruction(request_id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))?;

            if request.state != DestructionState::PendingApproval {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is {}, expected pending_approval",
                    request.id,
                    request.state.as_str()
                )));
            }
            let target = request
                .approvals
                .iter()
                .find(|a| a.level == level)
                .ok_or_else(|| {
                    WorkflowError::Validation(format!("no approval level {level} on this request"))
                })?;

            if let Decision::Deny(reason) = authz::authorize(
                actor,
                Action::ApproveDestruction { level },
                &ResourceContext::requested_by(&request.requested_by),
            ) {
                return Err(WorkflowError::Denied(reason));
            }
            if actor.role != Role::Admin && actor.role != target.required_role {
                return Err(WorkflowError::Denied(DenyReason::RoleNotPermitted));
            }
            // One decision per approver across the whole ladder.
            if request
                .approvals
                .iter()
                .any(|a| a.approver.as_deref() == Some(actor.username.as_str()))
            {
                return Err(WorkflowError::Denied(DenyReason::SelfApprovalForbidden));
            }
            if request
                .approvals
                .iter()
                .any(|a| a.level < level && a.status != ApprovalStatus::Approved)
            {
                return Err(WorkflowError::OutOfOrderApproval { level });
            }
            if target.status != ApprovalStatus::Pending {
                return Err(WorkflowError::invalid_state(format!(
                    "approval level {level} is already {}",
                    target.status.as_str()
                )));
            }

            if !txn.decide_approval(
                &request.id,
                level,
                ApprovalStatus::Approved,
                &actor.username,
                now,
                notes,
            )? {
                return Err(WorkflowError::invalid_state(format!(
                    "approval level {level} is no longer pending"
                )));
            }

            let all_approved = request
                .approvals
                .iter()
                .all(|a| a.level == level || a.status == ApprovalStatus::Approved);
            if all_approved
                && !txn.update_destruction_state(
                    &request.id,
                    DestructionState::PendingApproval,
                    DestructionState::Approved,
                )?
            {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is no longer pending approval",
                    request.id
                )));
            }

            for code in &request.item_codes {
                txn.append_event(
                    &NewCustodyEvent {
                        item_code: code.clone(),
                        action: CustodyAction::DestructionApprove,
                        actor: actor.username.clone(),
                        from_location: None,
                        to_location: None,
                        notes: Some(match notes {
                            Some(notes) => format!("level {level}: {notes}"),
                            None => format!("level {level}"),
                        }),
                    },
                    now,
                )?;
            }

            tracing::info!(
                request = %request.id,
                level,
                actor = %actor.username,
                fully_approved = all_approved,
                "destruction level approved"
            );
            txn.get_destruction(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))
        })
    }

    /// Rejects the request at one level. Terminal for the whole request;
    /// every item reverts to `InStorage`.
    ///
    /// # Errors
    ///
    /// `Denied` for gate refusals or a role below the level's requirement,
    /// `NotFound` for an unknown request, `InvalidState` unless the request
    /// is pending approval.
    pub fn reject(
        &self,
        actor: &User,
        request_id: &str,
        level: u32,
        notes: Option<&str>,
    ) -> Result<DestructionRequest, WorkflowError> {
        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_destruction(request_id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))?;

            if request.state != DestructionState::PendingApproval {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is {}, expected pending_approval",
                    request.id,
                    request.state.as_str()
                )));
            }
            let target = request
                .approvals
                .iter()
                .find(|a| a.level == level)
                .ok_or_else(|| {
                    WorkflowError::Validation(format!("no approval level {level} on this request"))
                })?;

            if let Decision::Deny(reason) = authz::authorize(
                actor,
                Action::ApproveDestruction { level },
                &ResourceContext::none(),
            ) {
                return Err(WorkflowError::Denied(reason));
            }
            if actor.role != Role::Admin && actor.role != target.required_role {
                return Err(WorkflowError::Denied(DenyReason::RoleNotPermitted));
            }
            if target.status != ApprovalStatus::Pending {
                return Err(WorkflowError::invalid_state(format!(
                    "approval level {level} is already {}",
                    target.status.as_str()
                )));
            }

            if !txn.decide_approval(
                &request.id,
                level,
                ApprovalStatus::Rejected,
                &actor.username,
                now,
                notes,
            )? {
                return Err(WorkflowError::invalid_state(format!(
                    "approval level {level} is no longer pending"
                )));
            }
            if !txn.update_destruction_state(
                &request.id,
                DestructionState::PendingApproval,
                DestructionState::Rejected,
            )? {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is no longer pending approval",
                    request.id
                )));
            }

            for code in &request.item_codes {
                if !txn.update_custody_status_only(
                    code,
                    ItemStatus::InStorage,
                    ItemStatus::PendingDestruction,
                )? {
                    return Err(WorkflowError::Conflict { code: code.clone() });
                }
                txn.append_event(
                    &NewCustodyEvent {
                        item_code: code.clone(),
                        action: CustodyAction::DestructionReject,
                        actor: actor.username.clone(),
                        from_location: None,
                        to_location: None,
                        notes: notes.map(str::to_string),
                    },
                    now,
                )?;
            }

            tracing::warn!(request = %request.id, level, actor = %actor.username, "destruction request rejected");
            txn.get_destruction(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))
        })
    }

    /// Executes a fully approved request.
    ///
    /// Item statuses and the witness minimum are re-checked at execution
    /// time to guard against concurrent transfers; then every item becomes
    /// `Destroyed` (terminal), occupancy counts drop, and a final `destroy`
    /// event naming the method and witnesses is appended per item.
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses, `NotFound` for an unknown request,
    /// `InvalidState` unless the request is approved and every item is
    /// still pending destruction, `Validation` when witnesses fall short.
    pub fn execute(&self, actor: &User, request_id: &str) -> Result<DestructionRequest, WorkflowError> {
        if let Decision::Deny(reason) =
            authz::authorize(actor, Action::RequestDestruction, &ResourceContext::none())
        {
            return Err(WorkflowError::Denied(reason));
        }

        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_destruction(request_id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))?;

            if request.state != DestructionState::Approved {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is {}, expected approved",
                    request.id,
                    request.state.as_str()
                )));
            }
            if request.witnesses.len() < self.policy.min_witnesses {
                return Err(WorkflowError::Validation(format!(
                    "at least {} witnesses are required, got {}",
                    self.policy.min_witnesses,
                    request.witnesses.len()
                )));
            }
            for code in &request.item_codes {
                let item = txn
                    .get_item(code)?
                    .ok_or_else(|| WorkflowError::not_found("item", code))?;
                if item.status != ItemStatus::PendingDestruction {
                    return Err(WorkflowError::invalid_state(format!(
                        "item {code} is {}, expected pending_destruction",
                        item.status
                    )));
                }
            }

            if !txn.destruction_mark_executed(&request.id, &actor.username, now)? {
                return Err(WorkflowError::invalid_state(format!(
                    "destruction request {} is no longer approved",
                    request.id
                )));
            }

            let witness_list = request
                .witnesses
                .iter()
                .map(|w| w.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            for code in &request.item_codes {
                let item = txn
                    .get_item(code)?
                    .ok_or_else(|| WorkflowError::not_found("item", code))?;
                if !txn.update_custody(
                    code,
                    item.custody_location.as_deref(),
                    ItemStatus::Destroyed,
                    ItemStatus::PendingDestruction,
                )? {
                    return Err(WorkflowError::Conflict { code: code.clone() });
                }
                if let Some(location) = item.custody_location.as_deref() {
                    txn.adjust_location_count(location, -1)?;
                }
                txn.append_event(
                    &NewCustodyEvent {
                        item_code: code.clone(),
                        action: CustodyAction::Destroy,
                        actor: actor.username.clone(),
                        from_location: item.custody_location.clone(),
                        to_location: None,
                        notes: Some(format!(
                            "method: {}; witnesses: {witness_list}",
                            request.method.as_str()
                        )),
                    },
                    now,
                )?;
            }

            tracing::warn!(
                request = %request.id,
                items = request.item_codes.len(),
                method = %request.method.as_str(),
                actor = %actor.username,
                "destruction executed"
            );
            txn.get_destruction(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))
        })
    }

    /// Looks up a request by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, request_id: &str) -> Result<DestructionRequest, WorkflowError> {
        self.store
            .get_destruction(request_id)?
            .ok_or_else(|| WorkflowError::not_found("destruction request", request_id))
    }

    /// Lists requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read.
    pub fn list(&self) -> Result<Vec<DestructionRequest>, WorkflowError> {
        Ok(self.store.list_destructions()?)
    }
}
