//! SQLite storage layer.
//!
//! This module owns every byte of persistent state: items, locations, users,
//! transfer and destruction requests, and the append-only custody event log.
//! The connection runs in WAL mode for concurrent reads; every workflow
//! transition executes inside a single transaction obtained through
//! [`Store::with_txn`], and item updates go through a compare-and-swap on
//! the item's current status so racing transitions resolve to exactly one
//! winner.
//!
//! Custody-event appends are serialized per item by the connection lock and
//! assign gapless, monotonic sequence numbers together with the chain hash,
//! inside the same transaction that mutates the ledger.

mod storage;

#[cfg(test)]
mod tests;

pub use storage::{Store, StoreError, StoreTxn};
