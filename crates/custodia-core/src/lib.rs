//! custodia-core - Chain-of-custody workflow core
//!
//! This library implements the backend workflow service for a contraband
//! management system: the canonical item ledger, the hash-chained custody
//! event log, and the transfer and destruction workflows with role-based
//! authorization gates at every transition.
//!
//! # Architecture
//!
//! State is owned by a single SQLite-backed [`store::Store`]. All mutations
//! run as one storage transaction, and item updates use compare-and-swap on
//! the item's current status so that racing workflow transitions yield
//! exactly one winner. The custody event log is append-only and hash-chained
//! per item; any tampering with a stored event breaks chain verification
//! from that sequence number onward.
//!
//! # Modules
//!
//! - [`authz`]: stateless authorization gate over the closed role/capability
//!   table, including the separation-of-duties rule
//! - [`config`]: `custodia.toml` parsing and validation
//! - [`custody`]: custody events, canonical encoding, hash-chain
//!   construction and verification
//! - [`destruction`]: multi-level destruction approval workflow
//! - [`error`]: the caller-recoverable workflow error taxonomy
//! - [`identity`]: user accounts, the closed role enumeration, credential
//!   verification
//! - [`item`]: item and storage-location domain types
//! - [`ledger`]: item ledger and location registry operations
//! - [`store`]: SQLite storage layer with WAL mode and transactional
//!   compare-and-swap primitives
//! - [`transfer`]: transfer request workflow

pub mod authz;
pub mod config;
pub mod custody;
pub mod destruction;
pub mod error;
pub mod identity;
pub mod item;
pub mod ledger;
pub mod store;
pub mod transfer;

pub use config::Config;
pub use custody::{ChainVerification, CustodyAction, CustodyEvent, CustodyLog};
pub use destruction::{DestructionRequest, DestructionState, DestructionWorkflow};
pub use error::WorkflowError;
pub use identity::{Registry, Role, User};
pub use item::{Item, ItemStatus, Location};
pub use ledger::ItemLedger;
pub use store::Store;
pub use transfer::{TransferRequest, TransferState, TransferWorkflow};
