//! crates/consultation_core/src/queue.rs
//!
//! Read-only, derived view of the pending queue. The queue is not a data
//! structure of its own: ordering and positions are recomputed from the store
//! on every call, so the view can never drift from the record of truth.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::QueueEntry;
use crate::ports::{Clock, ConsultationStore, EngineError, EngineResult};

/// Computes FIFO ordering and positions of pending consultations.
#[derive(Clone)]
pub struct QueueManager {
    store: Arc<dyn ConsultationStore>,
    clock: Arc<dyn Clock>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn ConsultationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// All pending consultations, oldest first, with 1-based positions and
    /// the minutes each one has been waiting. A single snapshot read; callers
    /// making decisions from it must re-check via a conditional write.
    pub async fn list_pending(&self) -> EngineResult<Vec<QueueEntry>> {
        let now = self.clock.now();
        let pending = self.store.list_pending().await?;
        Ok(pending
            .into_iter()
            .enumerate()
            .map(|(index, consultation)| {
                let waiting_minutes = (now - consultation.created_at).num_minutes().max(0);
                QueueEntry {
                    consultation,
                    position: index + 1,
                    waiting_minutes,
                }
            })
            .collect())
    }

    /// The 1-based queue position of a pending consultation: the count of
    /// older pending consultations plus one.
    pub async fn position_of(&self, id: Uuid) -> EngineResult<usize> {
        let pending = self.store.list_pending().await?;
        pending
            .iter()
            .position(|c| c.id == id)
            .map(|index| index + 1)
            .ok_or_else(|| EngineError::NotFound(format!("No pending consultation {id}")))
    }
}
