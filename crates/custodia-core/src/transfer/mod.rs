//! Transfer request workflow.
//!
//! State machine per request: `Pending --approve--> Approved --receive-->
//! Completed`, with `Pending --reject--> Rejected` as the terminal reject
//! path. Transitions are idempotent-rejecting: re-driving a terminal
//! request fails with `InvalidState` instead of silently succeeding, so the
//! ledger is never mutated twice for one decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::{self, Action, Decision, ResourceContext};
use crate::custody::{self, CustodyAction, NewCustodyEvent};
use crate::error::WorkflowError;
use crate::identity::User;
use crate::item::{ItemStatus, LocationStatus};
use crate::store::Store;

/// State of a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Awaiting a supervisor decision.
    Pending,
    /// Approved; the item is moving.
    Approved,
    /// Legacy alias for [`TransferState::Approved`] kept for imported
    /// records; never written by this workflow.
    InTransit,
    /// Received at the destination. Terminal.
    Completed,
    /// Rejected by a supervisor. Terminal.
    Rejected,
}

impl TransferState {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "in_transit" => Some(Self::InTransit),
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

/// Urgency of a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Normal handling.
    Normal,
    /// Expedited handling.
    Urgent,
}

impl Urgency {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// A transfer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Request id.
    pub id: String,
    /// The item being moved.
    pub item_code: String,
    /// Source location id; `None` for the initial placement of a freshly
    /// registered item.
    pub from_location: Option<String>,
    /// Destination location id.
    pub to_location: String,
    /// Username of the requester.
    pub requested_by: String,
    /// When the request was made.
    pub requested_at: DateTime<Utc>,
    /// Handling urgency.
    pub urgency: Urgency,
    /// Why the transfer is needed.
    pub reason: String,
    /// Current state.
    pub state: TransferState,
    /// Username of the approver, once approved.
    pub approved_by: Option<String>,
    /// When the request was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// Username of the receiver, once completed.
    pub received_by: Option<String>,
    /// When the item was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Free-text notes.
    pub notes: Option<String>,
}

/// Input for requesting a transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransferRequest {
    /// The item to move.
    pub item_code: String,
    /// Destination location id.
    pub to_location: String,
    /// Why the transfer is needed.
    pub reason: String,
    /// Handling urgency.
    #[serde(default = "default_urgency")]
    pub urgency: Urgency,
}

const fn default_urgency() -> Urgency {
    Urgency::Normal
}

/// The transfer workflow.
///
/// Every transition runs as one storage transaction: the request row, the
/// item's compare-and-swap update, and the custody event commit together or
/// not at all.
pub struct TransferWorkflow {
    store: Arc<Store>,
}

impl TransferWorkflow {
    /// Creates a workflow over the shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Requests a transfer.
    ///
    /// The item must be in storage (or freshly registered, for its initial
    /// placement) with no other active transfer request. On success the
    /// item becomes `PendingTransfer` and a `transfer_request` custody
    /// event is appended.
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses, `NotFound` for unknown item or
    /// destination, `InvalidState` when the item cannot be transferred,
    /// `Conflict` when the item was mutated concurrently.
    pub fn request(
        &self,
        actor: &User,
        new: &NewTransferRequest,
    ) -> Result<TransferRequest, WorkflowError> {
        if let Decision::Deny(reason) =
            authz::authorize(actor, Action::RequestTransfer, &ResourceContext::none())
        {
            return Err(WorkflowError::Denied(reason));
        }
        if new.reason.trim().is_empty() {
            return Err(WorkflowError::Validation("a reason is required".into()));
        }

        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let item = txn
                .get_item(&new.item_code)?
                .ok_or_else(|| WorkflowError::not_found("item", &new.item_code))?;

            if !matches!(item.status, ItemStatus::InStorage | ItemStatus::Registered) {
                return Err(WorkflowError::invalid_state(format!(
                    "item {} is {}, expected in_storage or registered",
                    item.code, item.status
                )));
            }
            if txn.active_transfer_for_item(&item.code)?.is_some() {
                return Err(WorkflowError::invalid_state(format!(
                    "item {} already has an active transfer request",
                    item.code
                )));
            }

            let destination = txn
                .get_location(&new.to_location)?
                .ok_or_else(|| WorkflowError::not_found("location", &new.to_location))?;
            if destination.status != LocationStatus::Active {
                return Err(WorkflowError::Validation(format!(
                    "location {} is not active",
                    destination.name
                )));
            }
            if item.custody_location.as_deref() == Some(destination.id.as_str()) {
                return Err(WorkflowError::Validation(
                    "item is already at the destination".into(),
                ));
            }

            if !txn.update_custody(
                &item.code,
                item.custody_location.as_deref(),
                ItemStatus::PendingTransfer,
                item.status,
            )? {
                return Err(WorkflowError::Conflict {
                    code: item.code.clone(),
                });
            }

            let request = TransferRequest {
                id: Uuid::new_v4().to_string(),
                item_code: item.code.clone(),
                from_location: item.custody_location.clone(),
                to_location: destination.id.clone(),
                requested_by: actor.username.clone(),
                requested_at: now,
                urgency: new.urgency,
                reason: new.reason.clone(),
                state: TransferState::Pending,
                approved_by: None,
                approved_at: None,
                received_by: None,
                received_at: None,
                notes: None,
            };
            txn.insert_transfer(&request)?;
            txn.append_event(
                &NewCustodyEvent {
                    item_code: item.code.clone(),
                    action: CustodyAction::TransferRequest,
                    actor: actor.username.clone(),
                    from_location: request.from_location.clone(),
                    to_location: Some(request.to_location.clone()),
                    notes: Some(request.reason.clone()),
                },
                now,
            )?;

            tracing::info!(
                request = %request.id,
                item = %request.item_code,
                to = %request.to_location,
                actor = %actor.username,
                "transfer requested"
            );
            Ok(request)
        })
    }

    /// Approves a pending request; the item goes `InTransit`.
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses (including self-approval),
    /// `NotFound` for an unknown request, `InvalidState` unless the request
    /// is pending, `Conflict` when the item raced another transition.
    pub fn approve(
        &self,
        actor: &User,
        request_id: &str,
        notes: Option<&str>,
    ) -> Result<TransferRequest, WorkflowError> {
        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_transfer(request_id)?
                .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))?;

            if let Decision::Deny(reason) = authz::authorize(
                actor,
                Action::ApproveTransfer,
                &ResourceContext::requested_by(&request.requested_by),
            ) {
                return Err(WorkflowError::Denied(reason));
            }
            if request.state != TransferState::Pending {
                return Err(WorkflowError::invalid_state(format!(
                    "transfer request {} is {}, expected pending",
                    request.id,
                    request.state.as_str()
                )));
            }

            if !txn.transfer_mark_approved(&request.id, &actor.username, now)? {
                return Err(WorkflowError::invalid_state(format!(
                    "transfer request {} is no longer pending",
                    request.id
                )));
            }
            if !txn.update_custody(
                &request.item_code,
                request.from_location.as_deref(),
                ItemStatus::InTransit,
                ItemStatus::PendingTransfer,
            )? {
                return Err(WorkflowError::Conflict {
                    code: request.item_code.clone(),
                });
            }
            txn.append_event(
                &NewCustodyEvent {
                    item_code: request.item_code.clone(),
                    action: CustodyAction::TransferApprove,
                    actor: actor.username.clone(),
                    from_location: request.from_location.clone(),
                    to_location: Some(request.to_location.clone()),
                    notes: notes.map(str::to_string),
                },
                now,
            )?;

            tracing::info!(request = %request.id, item = %request.item_code, actor = %actor.username, "transfer approved");
            txn.get_transfer(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))
        })
    }

    /// Rejects a pending request; the item reverts to where it was.
    ///
    /// A freshly registered item (no custody yet) goes back to
    /// `Registered`; anything else returns to `InStorage`.
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses, `NotFound` for an unknown request,
    /// `InvalidState` unless the request is pending.
    pub fn reject(
        &self,
        actor: &User,
        request_id: &str,
        notes: Option<&str>,
    ) -> Result<TransferRequest, WorkflowError> {
        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_transfer(request_id)?
                .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))?;

            if let Decision::Deny(reason) =
                authz::authorize(actor, Action::ApproveTransfer, &ResourceContext::none())
            {
                return Err(WorkflowError::Denied(reason));
            }
            if request.state != TransferState::Pending {
                return Err(WorkflowError::invalid_state(format!(
                    "transfer request {} is {}, expected pending",
                    request.id,
                    request.state.as_str()
                )));
            }

            let reverted = if request.from_location.is_none() {
                ItemStatus::Registered
            } else {
                ItemStatus::InStorage
            };
            if !txn.transfer_mark_rejected(&request.id)? {
                return Err(WorkflowError::invalid_state(format!(
                    "transfer request {} is no longer pending",
                    request.id
                )));
            }
            if !txn.update_custody(
                &request.item_code,
                request.from_location.as_deref(),
                reverted,
                ItemStatus::PendingTransfer,
            )? {
                return Err(WorkflowError::Conflict {
                    code: request.item_code.clone(),
                });
            }
            txn.append_event(
                &NewCustodyEvent {
                    item_code: request.item_code.clone(),
                    action: CustodyAction::TransferReject,
                    actor: actor.username.clone(),
                    from_location: request.from_location.clone(),
                    to_location: Some(request.to_location.clone()),
                    notes: notes.map(str::to_string),
                },
                now,
            )?;

            tracing::info!(request = %request.id, item = %request.item_code, actor = %actor.username, "transfer rejected");
            txn.get_transfer(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))
        })
    }

    /// Receives an approved transfer at its destination.
    ///
    /// Custody moves to the destination, the item returns to `InStorage`,
    /// and location occupancy counts are maintained. Receiving into a full
    /// location completes but raises the destination's over-capacity alarm.
    ///
    /// # Errors
    ///
    /// `Denied` when the gate refuses, `NotFound` for an unknown request,
    /// `InvalidState` unless the request is approved, `Conflict` when the
    /// item raced another transition.
    pub fn receive(&self, actor: &User, request_id: &str) -> Result<TransferRequest, WorkflowError> {
        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let request = txn
                .get_transfer(request_id)?
                .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))?;

            if let Decision::Deny(reason) =
                authz::authorize(actor, Action::ReceiveTransfer, &ResourceContext::none())
            {
                return Err(WorkflowError::Denied(reason));
            }
            if !matches!(
                request.state,
                TransferState::Approved | TransferState::InTransit
            ) {
                return Err(WorkflowError::invalid_state(format!(
                    "transfer request {} is {}, expected approved",
                    request.id,
                    request.state.as_str()
                )));
            }

            if !txn.transfer_mark_completed(&request.id, &actor.username, now)? {
                return Err(WorkflowError::invalid_state(format!(
                    "transfer request {} is no longer approved",
                    request.id
                )));
            }
            if !txn.update_custody(
                &request.item_code,
                Some(&request.to_location),
                ItemStatus::InStorage,
                ItemStatus::InTransit,
            )? {
                return Err(WorkflowError::Conflict {
                    code: request.item_code.clone(),
                });
            }

            if let Some(from) = request.from_location.as_deref() {
                txn.adjust_location_count(from, -1)?;
            }
            let destination = txn.adjust_location_count(&request.to_location, 1)?;
            if destination.over_capacity {
                tracing::warn!(
                    location = %destination.name,
                    occupancy = destination.current_items,
                    capacity = destination.capacity,
                    "location over capacity"
                );
            }

            txn.append_event(
                &NewCustodyEvent {
                    item_code: request.item_code.clone(),
                    action: CustodyAction::TransferReceive,
                    actor: actor.username.clone(),
                    from_location: request.from_location.clone(),
                    to_location: Some(request.to_location.clone()),
                    notes: None,
                },
                now,
            )?;

            tracing::info!(request = %request.id, item = %request.item_code, actor = %actor.username, "transfer received");
            txn.get_transfer(&request.id)?
                .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))
        })
    }

    /// Looks up a request by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, request_id: &str) -> Result<TransferRequest, WorkflowError> {
        self.store
            .get_transfer(request_id)?
            .ok_or_else(|| WorkflowError::not_found("transfer request", request_id))
    }

    /// Lists requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read.
    pub fn list(&self) -> Result<Vec<TransferRequest>, WorkflowError> {
        Ok(self.store.list_transfers()?)
    }
}
