//! Custody events and the per-item hash chain.
//!
//! Every workflow transition appends one [`CustodyEvent`] per affected item.
//! Events are append-only, numbered monotonically per item starting at 1,
//! and hash-chained: each event's hash covers the previous event's hash and
//! the event's canonical encoding. [`verify_events`] recomputes the chain
//! from genesis and reports the first mismatch without mutating anything.

pub mod hash;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::store::Store;

pub use hash::{ChainHashError, ChainHasher, Hash, HASH_SIZE};

/// The action a custody event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyAction {
    /// Initial seizure registration.
    Seize,
    /// A transfer was requested.
    TransferRequest,
    /// A transfer request was approved.
    TransferApprove,
    /// A transfer request was rejected.
    TransferReject,
    /// A transferred item was received at its destination.
    TransferReceive,
    /// The item was placed on a destruction request.
    DestructionRequest,
    /// A destruction approval level was granted.
    DestructionApprove,
    /// The destruction request was rejected.
    DestructionReject,
    /// The item was destroyed.
    Destroy,
}

impl CustodyAction {
    /// Stable string form used in storage and canonical encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seize => "seize",
            Self::TransferRequest => "transfer_request",
            Self::TransferApprove => "transfer_approve",
            Self::TransferReject => "transfer_reject",
            Self::TransferReceive => "transfer_receive",
            Self::DestructionRequest => "destruction_request",
            Self::DestructionApprove => "destruction_approve",
            Self::DestructionReject => "destruction_reject",
            Self::Destroy => "destroy",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seize" => Some(Self::Seize),
            "transfer_request" => Some(Self::TransferRequest),
            "transfer_approve" => Some(Self::TransferApprove),
            "transfer_reject" => Some(Self::TransferReject),
            "transfer_receive" => Some(Self::TransferReceive),
            "destruction_request" => Some(Self::DestructionRequest),
            "destruction_approve" => Some(Self::DestructionApprove),
            "destruction_reject" => Some(Self::DestructionReject),
            "destroy" => Some(Self::Destroy),
            _ => None,
        }
    }
}

/// One immutable entry in an item's custody chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyEvent {
    /// Sequence number, monotonic per item starting at 1.
    pub seq: u64,
    /// The item this event belongs to.
    pub item_code: String,
    /// What happened.
    pub action: CustodyAction,
    /// Username of the acting user.
    pub actor: String,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Source location id, when the action moves custody.
    pub from_location: Option<String>,
    /// Destination location id, when the action moves custody.
    pub to_location: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Hash of the previous event, `sha256:<hex>`; genesis for seq 1.
    pub prev_hash: String,
    /// Hash over `prev_hash || canonical encoding` of this event.
    pub hash: String,
}

/// Input for appending a custody event; hashing fields are assigned by the
/// storage layer inside the same transaction that mutates the ledger.
#[derive(Debug, Clone)]
pub struct NewCustodyEvent {
    /// The item this event belongs to.
    pub item_code: String,
    /// What happened.
    pub action: CustodyAction,
    /// Username of the acting user.
    pub actor: String,
    /// Source location id, if applicable.
    pub from_location: Option<String>,
    /// Destination location id, if applicable.
    pub to_location: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
}

/// Renders a timestamp in the single canonical form used for hashing and
/// storage. Microsecond precision survives a round-trip through SQLite.
#[must_use]
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current time truncated to the canonical microsecond precision, so a
/// timestamp hashes identically before and after a storage round-trip.
#[must_use]
pub fn canonical_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Canonical byte encoding of an event, excluding its hash fields.
///
/// Fields are joined with `\n` in a fixed order; absent optional fields
/// encode as the empty string. This encoding is what the chain hash covers.
#[must_use]
pub fn canonical_bytes(event: &CustodyEvent) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&event.seq.to_string());
    out.push('\n');
    out.push_str(&event.item_code);
    out.push('\n');
    out.push_str(event.action.as_str());
    out.push('\n');
    out.push_str(&event.actor);
    out.push('\n');
    out.push_str(&canonical_timestamp(&event.timestamp));
    out.push('\n');
    out.push_str(event.from_location.as_deref().unwrap_or(""));
    out.push('\n');
    out.push_str(event.to_location.as_deref().unwrap_or(""));
    out.push('\n');
    out.push_str(event.notes.as_deref().unwrap_or(""));
    out.into_bytes()
}

/// Result of verifying an item's custody chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainVerification {
    /// Every stored hash reproduces from genesis.
    Verified,
    /// The chain breaks at this sequence number.
    Broken {
        /// First event whose stored hashes don't reproduce.
        at_sequence: u64,
    },
}

/// Recomputes an item's chain from genesis.
///
/// `events` must be the item's full event list in sequence order. The check
/// never mutates; it reports the first event where the sequence numbering,
/// the stored previous-hash link, or the stored hash itself fails to
/// reproduce.
#[must_use]
pub fn verify_events(events: &[CustodyEvent]) -> ChainVerification {
    let mut prev: Hash = ChainHasher::GENESIS_PREV_HASH;

    for (index, event) in events.iter().enumerate() {
        let broken = ChainVerification::Broken {
            at_sequence: event.seq,
        };

        if event.seq != index as u64 + 1 {
            return broken;
        }
        if event.prev_hash != hash::encode(&prev) {
            return broken;
        }
        let Ok(stored) = hash::decode(&event.hash) else {
            return broken;
        };
        let computed = ChainHasher::hash_event(&canonical_bytes(event), &prev);
        if computed != stored {
            return broken;
        }
        prev = computed;
    }

    ChainVerification::Verified
}

/// Filter for audit queries over the custody log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events for this item.
    pub item_code: Option<String>,
    /// Only events by this actor.
    pub actor: Option<String>,
    /// Maximum number of events to return (0 means the store default).
    pub limit: u64,
}

/// Read side of the custody event log.
///
/// Appends happen exclusively inside workflow transactions; this type only
/// exposes ordered reads and chain verification.
pub struct CustodyLog {
    store: Arc<Store>,
}

impl CustodyLog {
    /// Creates a log view over the shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns an item's events in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown item.
    pub fn events_for_item(&self, item_code: &str) -> Result<Vec<CustodyEvent>, WorkflowError> {
        if self.store.get_item(item_code)?.is_none() {
            return Err(WorkflowError::not_found("item", item_code));
        }
        Ok(self.store.events_for_item(item_code)?)
    }

    /// Recomputes an item's chain from genesis and reports the result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown item; verification itself always
    /// completes and reports status rather than failing.
    pub fn verify_chain(&self, item_code: &str) -> Result<ChainVerification, WorkflowError> {
        let events = self.events_for_item(item_code)?;
        Ok(verify_events(&events))
    }

    /// Audit query across all items, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<CustodyEvent>, WorkflowError> {
        Ok(self.store.query_events(filter)?)
    }
}
