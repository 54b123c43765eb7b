//! Item and storage-location domain types.
//!
//! An [`Item`] is the canonical record of one piece of seized contraband.
//! Its status only ever moves forward through the custody lifecycle; the
//! single permitted reversal is the transfer reject path, which returns a
//! `PendingTransfer` item to where it was before the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a contraband item.
///
/// `Destroyed` is terminal: no workflow accepts a destroyed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Registered at seizure time, not yet assigned custody.
    Registered,
    /// Held at its custody location.
    InStorage,
    /// An active transfer request exists for the item.
    PendingTransfer,
    /// A transfer was approved and the item is moving.
    InTransit,
    /// Part of a destruction request awaiting approval or execution.
    PendingDestruction,
    /// Irreversibly disposed of.
    Destroyed,
}

impl ItemStatus {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::InStorage => "in_storage",
            Self::PendingTransfer => "pending_transfer",
            Self::InTransit => "in_transit",
            Self::PendingDestruction => "pending_destruction",
            Self::Destroyed => "destroyed",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "in_storage" => Some(Self::InStorage),
            "pending_transfer" => Some(Self::PendingTransfer),
            "in_transit" => Some(Self::InTransit),
            "pending_destruction" => Some(Self::PendingDestruction),
            "destroyed" => Some(Self::Destroyed),
            _ => None,
        }
    }

    /// True when no further transitions are permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical record of a contraband item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Immutable human-readable code, e.g. `CNB-2024-001`.
    pub code: String,
    /// Broad type, e.g. "Drugs", "Weapons".
    pub kind: String,
    /// Category within the type, e.g. "Cocaine".
    pub category: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Seized quantity.
    pub quantity: f64,
    /// Unit for `quantity`, e.g. "kg".
    pub unit: String,
    /// Serial number when the item has one.
    pub serial_number: Option<String>,
    /// Case file this seizure belongs to.
    pub case_number: Option<String>,
    /// Current lifecycle status.
    pub status: ItemStatus,
    /// Id of the location currently holding custody, if any.
    pub custody_location: Option<String>,
    /// Username of the seizing officer.
    pub seized_by: String,
    /// Agency of the seizing officer.
    pub agency: Option<String>,
    /// Registration notes.
    pub notes: Option<String>,
    /// When the item was registered.
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new seizure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    /// Explicit code; generated as `CNB-<year>-<seq>` when absent.
    pub code: Option<String>,
    /// Broad type of contraband.
    pub kind: String,
    /// Category within the type.
    pub category: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Seized quantity; must be positive.
    pub quantity: f64,
    /// Unit for the quantity.
    pub unit: String,
    /// Serial number, if any.
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Case file reference, if any.
    #[serde(default)]
    pub case_number: Option<String>,
    /// Seizing officer's agency.
    #[serde(default)]
    pub agency: Option<String>,
    /// Where the seizure happened (free text, recorded on the event).
    #[serde(default)]
    pub seizure_site: Option<String>,
    /// Registration notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Kind of storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// General warehouse.
    Warehouse,
    /// Evidence room attached to a station.
    EvidenceRoom,
    /// Short-term field storage.
    TemporaryStorage,
    /// High-security vault.
    SecureVault,
}

impl LocationKind {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::EvidenceRoom => "evidence_room",
            Self::TemporaryStorage => "temporary_storage",
            Self::SecureVault => "secure_vault",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "warehouse" => Some(Self::Warehouse),
            "evidence_room" => Some(Self::EvidenceRoom),
            "temporary_storage" => Some(Self::TemporaryStorage),
            "secure_vault" => Some(Self::SecureVault),
            _ => None,
        }
    }
}

/// Operational status of a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    /// Accepting and holding items.
    Active,
    /// Temporarily not accepting transfers.
    Maintenance,
    /// Decommissioned.
    Inactive,
}

impl LocationStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Inactive => "inactive",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "maintenance" => Some(Self::Maintenance),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// A storage location that can hold custody of items.
///
/// `current_items` is derived state maintained by the workflows: it must
/// equal the number of items whose custody location is this one. Occupancy
/// above `capacity` is only legal while `over_capacity` is raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Location id.
    pub id: String,
    /// Unique display name, e.g. "Warehouse A".
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Kind of facility.
    pub kind: LocationKind,
    /// Maximum number of items the location is rated for.
    pub capacity: u32,
    /// Number of items currently in custody here.
    pub current_items: u32,
    /// Username of the responsible manager.
    pub manager: String,
    /// Contact phone or email.
    pub contact: Option<String>,
    /// Operational status.
    pub status: LocationStatus,
    /// Raised while occupancy exceeds capacity.
    pub over_capacity: bool,
}

/// Input for registering a storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLocation {
    /// Unique display name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Kind of facility.
    pub kind: LocationKind,
    /// Rated capacity; must be at least 1.
    pub capacity: u32,
    /// Username of the responsible manager.
    pub manager: String,
    /// Contact phone or email.
    #[serde(default)]
    pub contact: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            ItemStatus::Registered,
            ItemStatus::InStorage,
            ItemStatus::PendingTransfer,
            ItemStatus::InTransit,
            ItemStatus::PendingDestruction,
            ItemStatus::Destroyed,
        ] {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ItemStatus::parse("no-such-status"), None);
    }

    #[test]
    fn destroyed_is_the_only_terminal_status() {
        assert!(ItemStatus::Destroyed.is_terminal());
        assert!(!ItemStatus::InStorage.is_terminal());
        assert!(!ItemStatus::PendingDestruction.is_terminal());
    }
}
