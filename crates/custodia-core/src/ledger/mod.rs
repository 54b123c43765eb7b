//! Item ledger and location registry.
//!
//! The ledger is the single authoritative owner of item state. Items enter
//! here at seizure registration; every later status change happens through
//! the transfer or destruction workflow via the storage layer's
//! compare-and-swap update, never through direct external calls.

use std::sync::Arc;

use chrono::Datelike;
use uuid::Uuid;

use crate::authz::{self, Action, Decision, ResourceContext};
use crate::custody::{self, CustodyAction, NewCustodyEvent};
use crate::error::WorkflowError;
use crate::identity::User;
use crate::item::{Item, ItemStatus, Location, LocationStatus, NewItem, NewLocation};
use crate::store::Store;

/// The item ledger and location registry.
pub struct ItemLedger {
    store: Arc<Store>,
}

impl ItemLedger {
    /// Creates a ledger over the shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Registers a seized item.
    ///
    /// The item starts as `Registered` with no custody location; its first
    /// custody event (`seize`) is appended in the same transaction. Item
    /// codes are generated as `CNB-<year>-<seq>` unless supplied.
    ///
    /// # Errors
    ///
    /// Returns `Denied` when the actor may not register seizures and
    /// `Validation` for malformed input or a duplicate code.
    pub fn register_item(&self, actor: &User, new: &NewItem) -> Result<Item, WorkflowError> {
        if let Decision::Deny(reason) =
            authz::authorize(actor, Action::RegisterSeizure, &ResourceContext::none())
        {
            return Err(WorkflowError::Denied(reason));
        }
        if new.kind.trim().is_empty() || new.category.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "type and category are required".into(),
            ));
        }
        if new.quantity <= 0.0 || !new.quantity.is_finite() {
            return Err(WorkflowError::Validation("quantity must be positive".into()));
        }
        if new.unit.trim().is_empty() {
            return Err(WorkflowError::Validation("unit is required".into()));
        }

        let now = custody::canonical_now();
        self.store.with_txn(|txn| {
            let code = match &new.code {
                Some(code) => {
                    if code.trim().is_empty() {
                        return Err(WorkflowError::Validation("item code must not be blank".into()));
                    }
                    if txn.get_item(code)?.is_some() {
                        return Err(WorkflowError::Validation(format!(
                            "item code already exists: {code}"
                        )));
                    }
                    code.clone()
                },
                None => txn.next_item_code(now.year())?,
            };

            let item = Item {
                code: code.clone(),
                kind: new.kind.clone(),
                category: new.category.clone(),
                description: new.description.clone(),
                quantity: new.quantity,
                unit: new.unit.clone(),
                serial_number: new.serial_number.clone(),
                case_number: new.case_number.clone(),
                status: ItemStatus::Registered,
                custody_location: None,
                seized_by: actor.username.clone(),
                agency: new.agency.clone(),
                notes: new.notes.clone(),
                created_at: now,
            };
            txn.insert_item(&item)?;
            txn.append_event(
                &NewCustodyEvent {
                    item_code: code,
                    action: CustodyAction::Seize,
                    actor: actor.username.clone(),
                    from_location: None,
                    to_location: None,
                    notes: new.seizure_site.clone(),
                },
                now,
            )?;

            tracing::info!(code = %item.code, kind = %item.kind, actor = %actor.username, "seizure registered");
            Ok(item)
        })
    }

    /// Looks up an item by code.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown code.
    pub fn get_item(&self, code: &str) -> Result<Item, WorkflowError> {
        self.store
            .get_item(code)?
            .ok_or_else(|| WorkflowError::not_found("item", code))
    }

    /// Lists items, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read.
    pub fn list_items(&self) -> Result<Vec<Item>, WorkflowError> {
        Ok(self.store.list_items()?)
    }

    /// Registers a storage location.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name, zero capacity, or a duplicate
    /// name.
    pub fn add_location(&self, new: &NewLocation) -> Result<Location, WorkflowError> {
        if new.name.trim().is_empty() {
            return Err(WorkflowError::Validation("location name is required".into()));
        }
        if new.capacity == 0 {
            return Err(WorkflowError::Validation(
                "location capacity must be at least 1".into(),
            ));
        }

        let location = Location {
            id: Uuid::new_v4().to_string(),
            name: new.name.clone(),
            address: new.address.clone(),
            kind: new.kind,
            capacity: new.capacity,
            current_items: 0,
            manager: new.manager.clone(),
            contact: new.contact.clone(),
            status: LocationStatus::Active,
            over_capacity: false,
        };
        self.store.with_txn(|txn| {
            if txn.location_name_exists(&new.name)? {
                return Err(WorkflowError::Validation(format!(
                    "location name already exists: {}",
                    new.name
                )));
            }
            txn.insert_location(&location)?;
            Ok(())
        })?;
        tracing::info!(name = %location.name, kind = ?location.kind, "location registered");
        Ok(location)
    }

    /// Looks up a location by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_location(&self, id: &str) -> Result<Location, WorkflowError> {
        self.store
            .get_location(id)?
            .ok_or_else(|| WorkflowError::not_found("location", id))
    }

    /// Lists all locations.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read.
    pub fn list_locations(&self) -> Result<Vec<Location>, WorkflowError> {
        Ok(self.store.list_locations()?)
    }

    /// A location together with the items currently in custody there.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn location_detail(&self, id: &str) -> Result<(Location, Vec<Item>), WorkflowError> {
        let location = self.get_location(id)?;
        let items = self.store.items_at_location(id)?;
        Ok((location, items))
    }
}
