//! services/api/src/web/state.rs
//!
//! Defines the application's shared state: the engine components wired to
//! their adapters, created once at startup and passed to all handlers.

use std::sync::Arc;

use consultation_core::{
    AssignmentCoordinator, CommissionLedger, ConsultationStore, LifecycleService,
    MessageService, QueueManager,
};

use crate::config::Config;

/// The shared application state, created once at startup and passed to all
/// handlers. The fallback activator is not here: it lives with the scan
/// worker, which is its only caller.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConsultationStore>,
    pub queue: QueueManager,
    pub coordinator: AssignmentCoordinator,
    pub lifecycle: LifecycleService,
    pub messages: MessageService,
    pub ledger: CommissionLedger,
}
