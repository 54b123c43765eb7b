//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use custodia_core::custody::CustodyLog;
use custodia_core::destruction::DestructionWorkflow;
use custodia_core::identity::Registry;
use custodia_core::ledger::ItemLedger;
use custodia_core::transfer::TransferWorkflow;
use custodia_core::{Config, Store};

use crate::auth::SessionStore;
use crate::metrics::ServerMetrics;

/// Everything handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Item ledger and location registry.
    pub ledger: Arc<ItemLedger>,
    /// Custody event log (read side).
    pub log: Arc<CustodyLog>,
    /// Transfer workflow.
    pub transfers: Arc<TransferWorkflow>,
    /// Destruction workflow.
    pub destructions: Arc<DestructionWorkflow>,
    /// Identity registry.
    pub registry: Arc<Registry>,
    /// Login sessions.
    pub sessions: Arc<SessionStore>,
    /// Prometheus counters.
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    /// Wires the full component graph over one shared store.
    #[must_use]
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        Self {
            ledger: Arc::new(ItemLedger::new(Arc::clone(&store))),
            log: Arc::new(CustodyLog::new(Arc::clone(&store))),
            transfers: Arc::new(TransferWorkflow::new(Arc::clone(&store))),
            destructions: Arc::new(DestructionWorkflow::new(
                Arc::clone(&store),
                config.destruction.clone(),
            )),
            registry: Arc::new(Registry::new(store)),
            sessions: Arc::new(SessionStore::new(Duration::from_secs(
                config.auth.session_ttl_secs,
            ))),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }
}
