//! `SQLite`-backed storage implementation.

// Mutex poisoning indicates a panic in another thread, which is
// unrecoverable; lock().unwrap() is intentional throughout.
#![allow(clippy::missing_panics_doc)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;

use crate::custody::{self, CustodyAction, CustodyEvent, EventFilter, NewCustodyEvent};
use crate::custody::hash::{self as chain_hash, ChainHasher};
use crate::destruction::{
    ApprovalLevel, ApprovalStatus, DestructionMethod, DestructionRequest, DestructionState,
    Witness,
};
use crate::identity::{Role, User};
use crate::item::{Item, ItemStatus, Location, LocationKind, LocationStatus};
use crate::transfer::{TransferRequest, TransferState, Urgency};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Default cap for unbounded listings.
const DEFAULT_LIST_LIMIT: u64 = 200;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded back into its domain type.
    #[error("corrupt row: {detail}")]
    Corrupt {
        /// What failed to decode.
        detail: String,
    },
}

fn corrupt(detail: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        detail: detail.into(),
    }
}

/// The storage backend shared by the ledger, the custody log, and both
/// workflows.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens or creates a database at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` inside a single transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err`. The connection lock serializes transactions, which is
    /// what guarantees gapless per-item event sequence numbers.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`, and commit/begin failures as
    /// `StoreError`.
    pub fn with_txn<T, E>(&self, f: impl FnOnce(&StoreTxn<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| E::from(StoreError::from(e)))?;
        let out = f(&StoreTxn { conn: &*tx })?;
        tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
        Ok(out)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Looks up an item by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_item(&self, code: &str) -> Result<Option<Item>, StoreError> {
        self.with_conn(|conn| get_item(conn, code))
    }

    /// Lists items, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at DESC, code DESC"
            ))?;
            collect_rows(&mut stmt, [], item_from_row)
        })
    }

    /// Looks up a location by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_location(&self, id: &str) -> Result<Option<Location>, StoreError> {
        self.with_conn(|conn| get_location(conn, id))
    }

    /// Lists all locations by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY name"
            ))?;
            collect_rows(&mut stmt, [], location_from_row)
        })
    }

    /// Lists items currently in custody at a location.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn items_at_location(&self, location_id: &str) -> Result<Vec<Item>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE custody_location = ?1 AND status != 'destroyed'
                 ORDER BY code"
            ))?;
            collect_rows(&mut stmt, params![location_id], item_from_row)
        })
    }

    /// Looks up a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
            ))?
            .query_row(params![username], user_from_row)
            .optional()?
            .transpose()
        })
    }

    /// Looks up a user together with their stored password hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_user_with_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        self.with_conn(|conn| {
            conn.prepare(&format!(
                "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"
            ))?
            .query_row(params![username], |row| {
                let user = user_from_row(row)?;
                let hash: String = row.get(8)?;
                Ok((user, hash))
            })
            .optional()?
            .map(|(user, hash)| Ok((user?, hash)))
            .transpose()
        })
    }

    /// Lists all user accounts by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
            collect_rows(&mut stmt, [], user_from_row)
        })
    }

    /// Inserts a user account with its password hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including username collisions).
    pub fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, role, station, active, mfa_enabled, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.id,
                    user.username,
                    user.display_name,
                    user.role.as_str(),
                    user.station,
                    user.active,
                    user.mfa_enabled,
                    password_hash,
                    custody::canonical_timestamp(&user.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Marks a user inactive and returns the updated record.
    ///
    /// # Errors
    ///
    /// Returns an error if the update or re-read fails.
    pub fn deactivate_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE users SET active = 0 WHERE id = ?1", params![user_id])?;
            if changed == 0 {
                return Ok(None);
            }
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?
                .query_row(params![user_id], user_from_row)
                .optional()?
                .transpose()
        })
    }

    /// Returns an item's custody events in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn events_for_item(&self, item_code: &str) -> Result<Vec<CustodyEvent>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM custody_events WHERE item_code = ?1 ORDER BY seq"
            ))?;
            collect_rows(&mut stmt, params![item_code], event_from_row)
        })
    }

    /// Audit query over all custody events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn query_events(&self, filter: &EventFilter) -> Result<Vec<CustodyEvent>, StoreError> {
        let limit = if filter.limit == 0 {
            DEFAULT_LIST_LIMIT
        } else {
            filter.limit
        };
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM custody_events
                 WHERE (?1 IS NULL OR item_code = ?1)
                   AND (?2 IS NULL OR actor = ?2)
                 ORDER BY timestamp DESC, item_code, seq DESC
                 LIMIT ?3"
            ))?;
            collect_rows(
                &mut stmt,
                params![filter.item_code, filter.actor, limit],
                event_from_row,
            )
        })
    }

    /// Looks up a transfer request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_transfer(&self, id: &str) -> Result<Option<TransferRequest>, StoreError> {
        self.with_conn(|conn| get_transfer(conn, id))
    }

    /// Lists transfer requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_transfers(&self) -> Result<Vec<TransferRequest>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRANSFER_COLUMNS} FROM transfer_requests
                 ORDER BY requested_at DESC, id DESC
                 LIMIT ?1"
            ))?;
            collect_rows(&mut stmt, params![DEFAULT_LIST_LIMIT], transfer_from_row)
        })
    }

    /// Looks up a destruction request (with items, approvals, witnesses).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn get_destruction(&self, id: &str) -> Result<Option<DestructionRequest>, StoreError> {
        self.with_conn(|conn| get_destruction(conn, id))
    }

    /// Lists destruction requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_destructions(&self) -> Result<Vec<DestructionRequest>, StoreError> {
        self.with_conn(|conn| {
            let ids: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT id FROM destruction_requests
                     ORDER BY requested_at DESC, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![DEFAULT_LIST_LIMIT], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            let mut requests = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(request) = get_destruction(conn, &id)? {
                    requests.push(request);
                }
            }
            Ok(requests)
        })
    }
}

/// A handle to an open transaction, passed to [`Store::with_txn`] closures.
///
/// All mutations live here; read helpers are duplicated where workflows need
/// them mid-transaction.
pub struct StoreTxn<'a> {
    conn: &'a Connection,
}

impl StoreTxn<'_> {
    /// Looks up an item by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_item(&self, code: &str) -> Result<Option<Item>, StoreError> {
        get_item(self.conn, code)
    }

    /// Inserts a freshly registered item.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including code collisions).
    pub fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO items (code, kind, category, description, quantity, unit, serial_number,
                                case_number, status, custody_location, seized_by, agency, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                item.code,
                item.kind,
                item.category,
                item.description,
                item.quantity,
                item.unit,
                item.serial_number,
                item.case_number,
                item.status.as_str(),
                item.custody_location,
                item.seized_by,
                item.agency,
                item.notes,
                custody::canonical_timestamp(&item.created_at),
            ],
        )?;
        Ok(())
    }

    /// Next free item code of the form `CNB-<year>-<seq>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn next_item_code(&self, year: i32) -> Result<String, StoreError> {
        let prefix = format!("CNB-{year}-%");
        let mut seq: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE code LIKE ?1",
            params![prefix],
            |row| row.get::<_, i64>(0).map(|n| n as u64),
        )? + 1;
        loop {
            let code = format!("CNB-{year}-{seq:03}");
            let taken: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM items WHERE code = ?1)",
                params![code],
                |row| row.get(0),
            )?;
            if !taken {
                return Ok(code);
            }
            seq += 1;
        }
    }

    /// Compare-and-swap update of an item's `(status, custody)`.
    ///
    /// Succeeds only if the item's current status equals `expected`; returns
    /// `false` (no rows changed) otherwise, which callers surface as
    /// `Conflict`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_custody(
        &self,
        code: &str,
        new_location: Option<&str>,
        new_status: ItemStatus,
        expected: ItemStatus,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE items SET status = ?2, custody_location = ?3
             WHERE code = ?1 AND status = ?4",
            params![code, new_status.as_str(), new_location, expected.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Looks up a location by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_location(&self, id: &str) -> Result<Option<Location>, StoreError> {
        get_location(self.conn, id)
    }

    /// Compare-and-swap update of an item's status alone, leaving custody
    /// untouched. Used by the destruction workflow, which never moves items.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_custody_status_only(
        &self,
        code: &str,
        new_status: ItemStatus,
        expected: ItemStatus,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE items SET status = ?2 WHERE code = ?1 AND status = ?3",
            params![code, new_status.as_str(), expected.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Whether a location with this display name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn location_name_exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM locations WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Inserts a location.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including name collisions).
    pub fn insert_location(&self, location: &Location) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO locations (id, name, address, kind, capacity, current_items, manager, contact, status, over_capacity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                location.id,
                location.name,
                location.address,
                location.kind.as_str(),
                location.capacity,
                location.current_items,
                location.manager,
                location.contact,
                location.status.as_str(),
                location.over_capacity,
            ],
        )?;
        Ok(())
    }

    /// Adjusts a location's occupancy count and maintains the over-capacity
    /// alarm flag. Returns the updated location.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is missing or the update fails.
    pub fn adjust_location_count(&self, id: &str, delta: i64) -> Result<Location, StoreError> {
        let location = get_location(self.conn, id)?
            .ok_or_else(|| corrupt(format!("location vanished mid-transaction: {id}")))?;
        let count = i64::from(location.current_items) + delta;
        let count = u32::try_from(count.max(0))
            .map_err(|_| corrupt(format!("occupancy out of range for location {id}")))?;
        let over_capacity = count > location.capacity;
        self.conn.execute(
            "UPDATE locations SET current_items = ?2, over_capacity = ?3 WHERE id = ?1",
            params![id, count, over_capacity],
        )?;
        Ok(Location {
            current_items: count,
            over_capacity,
            ..location
        })
    }

    /// Appends a custody event, assigning the next per-item sequence number
    /// and the chain hash inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain head cannot be read or the insert
    /// fails.
    pub fn append_event(
        &self,
        new: &NewCustodyEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<CustodyEvent, StoreError> {
        let head: Option<(u64, String)> = self
            .conn
            .query_row(
                "SELECT seq, hash FROM custody_events
                 WHERE item_code = ?1 ORDER BY seq DESC LIMIT 1",
                params![new.item_code],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)),
            )
            .optional()?;

        let (seq, prev) = match head {
            Some((last_seq, last_hash)) => {
                let prev = chain_hash::decode(&last_hash)
                    .map_err(|e| corrupt(format!("chain head for {}: {e}", new.item_code)))?;
                (last_seq + 1, prev)
            },
            None => (1, ChainHasher::GENESIS_PREV_HASH),
        };

        let mut event = CustodyEvent {
            seq,
            item_code: new.item_code.clone(),
            action: new.action,
            actor: new.actor.clone(),
            timestamp,
            from_location: new.from_location.clone(),
            to_location: new.to_location.clone(),
            notes: new.notes.clone(),
            prev_hash: chain_hash::encode(&prev),
            hash: String::new(),
        };
        let hash = ChainHasher::hash_event(&custody::canonical_bytes(&event), &prev);
        event.hash = chain_hash::encode(&hash);

        self.conn.execute(
            "INSERT INTO custody_events (item_code, seq, action, actor, timestamp, from_location, to_location, notes, prev_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.item_code,
                event.seq,
                event.action.as_str(),
                event.actor,
                custody::canonical_timestamp(&event.timestamp),
                event.from_location,
                event.to_location,
                event.notes,
                event.prev_hash,
                event.hash,
            ],
        )?;
        Ok(event)
    }

    /// Looks up a transfer request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_transfer(&self, id: &str) -> Result<Option<TransferRequest>, StoreError> {
        get_transfer(self.conn, id)
    }

    /// The item's active transfer request, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn active_transfer_for_item(
        &self,
        item_code: &str,
    ) -> Result<Option<TransferRequest>, StoreError> {
        self.conn
            .prepare(&format!(
                "SELECT {TRANSFER_COLUMNS} FROM transfer_requests
                 WHERE item_code = ?1 AND state IN ('pending', 'approved', 'in_transit')"
            ))?
            .query_row(params![item_code], transfer_from_row)
            .optional()?
            .transpose()
    }

    /// Inserts a transfer request.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including the one-active-
    /// transfer-per-item index).
    pub fn insert_transfer(&self, request: &TransferRequest) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO transfer_requests (id, item_code, from_location, to_location, requested_by,
                                            requested_at, urgency, reason, state, approved_by,
                                            approved_at, received_by, received_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                request.id,
                request.item_code,
                request.from_location,
                request.to_location,
                request.requested_by,
                custody::canonical_timestamp(&request.requested_at),
                request.urgency.as_str(),
                request.reason,
                request.state.as_str(),
                request.approved_by,
                request.approved_at.map(|t| custody::canonical_timestamp(&t)),
                request.received_by,
                request.received_at.map(|t| custody::canonical_timestamp(&t)),
                request.notes,
            ],
        )?;
        Ok(())
    }

    /// Compare-and-swap `Pending -> Approved` with approver attribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn transfer_mark_approved(
        &self,
        id: &str,
        approver: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE transfer_requests
             SET state = 'approved', approved_by = ?2, approved_at = ?3
             WHERE id = ?1 AND state = 'pending'",
            params![id, approver, custody::canonical_timestamp(&at)],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-swap `Pending -> Rejected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn transfer_mark_rejected(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE transfer_requests SET state = 'rejected' WHERE id = ?1 AND state = 'pending'",
            params![id],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-swap `Approved/InTransit -> Completed` with receiver
    /// attribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn transfer_mark_completed(
        &self,
        id: &str,
        receiver: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE transfer_requests
             SET state = 'completed', received_by = ?2, received_at = ?3
             WHERE id = ?1 AND state IN ('approved', 'in_transit')",
            params![id, receiver, custody::canonical_timestamp(&at)],
        )?;
        Ok(changed == 1)
    }

    /// Looks up a destruction request (with items, approvals, witnesses).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn get_destruction(&self, id: &str) -> Result<Option<DestructionRequest>, StoreError> {
        get_destruction(self.conn, id)
    }

    /// Whether the item belongs to a destruction request that is not yet
    /// terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn item_in_active_destruction(&self, item_code: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM destruction_items di
                JOIN destruction_requests dr ON dr.id = di.request_id
                WHERE di.item_code = ?1
                  AND dr.state IN ('draft', 'pending_approval', 'approved')
             )",
            params![item_code],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Inserts a destruction request with its items, approval levels, and
    /// witnesses.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn insert_destruction(&self, request: &DestructionRequest) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO destruction_requests (id, requested_by, requested_at, method, scheduled_date,
                                               legal_reason, state, executed_by, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                request.id,
                request.requested_by,
                custody::canonical_timestamp(&request.requested_at),
                request.method.as_str(),
                request.scheduled_date.map(|d| d.to_string()),
                request.legal_reason,
                request.state.as_str(),
                request.executed_by,
                request.executed_at.map(|t| custody::canonical_timestamp(&t)),
            ],
        )?;
        for item_code in &request.item_codes {
            self.conn.execute(
                "INSERT INTO destruction_items (request_id, item_code) VALUES (?1, ?2)",
                params![request.id, item_code],
            )?;
        }
        for approval in &request.approvals {
            self.conn.execute(
                "INSERT INTO destruction_approvals (request_id, level, required_role, status, approver, decided_at, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.id,
                    approval.level,
                    approval.required_role.as_str(),
                    approval.status.as_str(),
                    approval.approver,
                    approval.decided_at.map(|t| custody::canonical_timestamp(&t)),
                    approval.notes,
                ],
            )?;
        }
        for (position, witness) in request.witnesses.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO destruction_witnesses (request_id, position, name, role)
                 VALUES (?1, ?2, ?3, ?4)",
                params![request.id, position as i64, witness.name, witness.role],
            )?;
        }
        Ok(())
    }

    /// Compare-and-swap on a destruction request's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_destruction_state(
        &self,
        id: &str,
        expected: DestructionState,
        new: DestructionState,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE destruction_requests SET state = ?3 WHERE id = ?1 AND state = ?2",
            params![id, expected.as_str(), new.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-swap `Approved -> Completed` with executor attribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn destruction_mark_executed(
        &self,
        id: &str,
        executor: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE destruction_requests
             SET state = 'completed', executed_by = ?2, executed_at = ?3
             WHERE id = ?1 AND state = 'approved'",
            params![id, executor, custody::canonical_timestamp(&at)],
        )?;
        Ok(changed == 1)
    }

    /// Decides one approval level; succeeds only while the level is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn decide_approval(
        &self,
        request_id: &str,
        level: u32,
        status: ApprovalStatus,
        approver: &str,
        at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE destruction_approvals
             SET status = ?3, approver = ?4, decided_at = ?5, notes = ?6
             WHERE request_id = ?1 AND level = ?2 AND status = 'pending'",
            params![
                request_id,
                level,
                status.as_str(),
                approver,
                custody::canonical_timestamp(&at),
                notes,
            ],
        )?;
        Ok(changed == 1)
    }
}

// Column lists shared by queries and row mappers. Order matters; the
// *_from_row functions index into it.
const ITEM_COLUMNS: &str = "code, kind, category, description, quantity, unit, serial_number, \
                            case_number, status, custody_location, seized_by, agency, notes, created_at";
const LOCATION_COLUMNS: &str =
    "id, name, address, kind, capacity, current_items, manager, contact, status, over_capacity";
const USER_COLUMNS: &str =
    "id, username, display_name, role, station, active, mfa_enabled, created_at";
const EVENT_COLUMNS: &str = "item_code, seq, action, actor, timestamp, from_location, \
                             to_location, notes, prev_hash, hash";
const TRANSFER_COLUMNS: &str = "id, item_code, from_location, to_location, requested_by, requested_at, \
                                urgency, reason, state, approved_by, approved_at, received_by, received_at, notes";

type RowResult<T> = Result<Result<T, StoreError>, rusqlite::Error>;

fn collect_rows<T, P: rusqlite::Params>(
    stmt: &mut rusqlite::Statement<'_>,
    params: P,
    map: impl Fn(&rusqlite::Row<'_>) -> RowResult<T>,
) -> Result<Vec<T>, StoreError> {
    let rows = stmt.query_map(params, map)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| corrupt(format!("bad timestamp: {value}")))
}

fn parse_opt_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn item_from_row(row: &rusqlite::Row<'_>) -> RowResult<Item> {
    let status: String = row.get(8)?;
    let created_at: String = row.get(13)?;
    Ok((|| {
        Ok(Item {
            code: row.get(0)?,
            kind: row.get(1)?,
            category: row.get(2)?,
            description: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            serial_number: row.get(6)?,
            case_number: row.get(7)?,
            status: ItemStatus::parse(&status)
                .ok_or_else(|| corrupt(format!("unknown item status: {status}")))?,
            custody_location: row.get(9)?,
            seized_by: row.get(10)?,
            agency: row.get(11)?,
            notes: row.get(12)?,
            created_at: parse_timestamp(&created_at)?,
        })
    })())
}

fn location_from_row(row: &rusqlite::Row<'_>) -> RowResult<Location> {
    let kind: String = row.get(3)?;
    let status: String = row.get(8)?;
    Ok((|| {
        Ok(Location {
            id: row.get(0)?,
            name: row.get(1)?,
            address: row.get(2)?,
            kind: LocationKind::parse(&kind)
                .ok_or_else(|| corrupt(format!("unknown location kind: {kind}")))?,
            capacity: row.get(4)?,
            current_items: row.get(5)?,
            manager: row.get(6)?,
            contact: row.get(7)?,
            status: LocationStatus::parse(&status)
                .ok_or_else(|| corrupt(format!("unknown location status: {status}")))?,
            over_capacity: row.get(9)?,
        })
    })())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> RowResult<User> {
    let role: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    Ok((|| {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            role: Role::parse(&role).ok_or_else(|| corrupt(format!("unknown role: {role}")))?,
            station: row.get(4)?,
            active: row.get(5)?,
            mfa_enabled: row.get(6)?,
            created_at: parse_timestamp(&created_at)?,
        })
    })())
}

fn event_from_row(row: &rusqlite::Row<'_>) -> RowResult<CustodyEvent> {
    let action: String = row.get(2)?;
    let timestamp: String = row.get(4)?;
    Ok((|| {
        Ok(CustodyEvent {
            item_code: row.get(0)?,
            seq: row.get::<_, i64>(1)? as u64,
            action: CustodyAction::parse(&action)
                .ok_or_else(|| corrupt(format!("unknown custody action: {action}")))?,
            actor: row.get(3)?,
            timestamp: parse_timestamp(&timestamp)?,
            from_location: row.get(5)?,
            to_location: row.get(6)?,
            notes: row.get(7)?,
            prev_hash: row.get(8)?,
            hash: row.get(9)?,
        })
    })())
}

fn transfer_from_row(row: &rusqlite::Row<'_>) -> RowResult<TransferRequest> {
    let requested_at: String = row.get(5)?;
    let urgency: String = row.get(6)?;
    let state: String = row.get(8)?;
    let approved_at: Option<String> = row.get(10)?;
    let received_at: Option<String> = row.get(12)?;
    Ok((|| {
        Ok(TransferRequest {
            id: row.get(0)?,
            item_code: row.get(1)?,
            from_location: row.get(2)?,
            to_location: row.get(3)?,
            requested_by: row.get(4)?,
            requested_at: parse_timestamp(&requested_at)?,
            urgency: Urgency::parse(&urgency)
                .ok_or_else(|| corrupt(format!("unknown urgency: {urgency}")))?,
            reason: row.get(7)?,
            state: TransferState::parse(&state)
                .ok_or_else(|| corrupt(format!("unknown transfer state: {state}")))?,
            approved_by: row.get(9)?,
            approved_at: parse_opt_timestamp(approved_at)?,
            received_by: row.get(11)?,
            received_at: parse_opt_timestamp(received_at)?,
            notes: row.get(13)?,
        })
    })())
}

fn get_item(conn: &Connection, code: &str) -> Result<Option<Item>, StoreError> {
    conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE code = ?1"))?
        .query_row(params![code], item_from_row)
        .optional()?
        .transpose()
}

fn get_location(conn: &Connection, id: &str) -> Result<Option<Location>, StoreError> {
    conn.prepare(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?1"
    ))?
    .query_row(params![id], location_from_row)
    .optional()?
    .transpose()
}

fn get_transfer(conn: &Connection, id: &str) -> Result<Option<TransferRequest>, StoreError> {
    conn.prepare(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM transfer_requests WHERE id = ?1"
    ))?
    .query_row(params![id], transfer_from_row)
    .optional()?
    .transpose()
}

fn get_destruction(conn: &Connection, id: &str) -> Result<Option<DestructionRequest>, StoreError> {
    let base = conn
        .query_row(
            "SELECT id, requested_by, requested_at, method, scheduled_date, legal_reason, state,
                    executed_by, executed_at
             FROM destruction_requests WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((
        id,
        requested_by,
        requested_at,
        method,
        scheduled_date,
        legal_reason,
        state,
        executed_by,
        executed_at,
    )) = base
    else {
        return Ok(None);
    };

    let item_codes: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT item_code FROM destruction_items WHERE request_id = ?1 ORDER BY item_code")?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let approvals: Vec<ApprovalLevel> = {
        let mut stmt = conn.prepare(
            "SELECT level, required_role, status, approver, decided_at, notes
             FROM destruction_approvals WHERE request_id = ?1 ORDER BY level",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, i64>(0)? as u32,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (level, required_role, status, approver, decided_at, notes) = row?;
            out.push(ApprovalLevel {
                level,
                required_role: Role::parse(&required_role)
                    .ok_or_else(|| corrupt(format!("unknown role: {required_role}")))?,
                status: ApprovalStatus::parse(&status)
                    .ok_or_else(|| corrupt(format!("unknown approval status: {status}")))?,
                approver,
                decided_at: parse_opt_timestamp(decided_at)?,
                notes,
            });
        }
        out
    };

    let witnesses: Vec<Witness> = {
        let mut stmt = conn.prepare(
            "SELECT name, role FROM destruction_witnesses WHERE request_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(Witness {
                name: row.get(0)?,
                role: row.get(1)?,
            })
        })?;
        rows.collect::<Result<_, _>>()?
    };

    Ok(Some(DestructionRequest {
        id,
        item_codes,
        requested_by,
        requested_at: parse_timestamp(&requested_at)?,
        method: DestructionMethod::parse(&method)
            .ok_or_else(|| corrupt(format!("unknown destruction method: {method}")))?,
        scheduled_date: scheduled_date
            .map(|d| {
                d.parse::<NaiveDate>()
                    .map_err(|_| corrupt(format!("bad scheduled date: {d}")))
            })
            .transpose()?,
        legal_reason,
        state: DestructionState::parse(&state)
            .ok_or_else(|| corrupt(format!("unknown destruction state: {state}")))?,
        approvals,
        witnesses,
        executed_by,
        executed_at: parse_opt_timestamp(executed_at)?,
    }))
}
