//! crates/consultation_core/src/assignment.rs
//!
//! The single, race-free transition from "pending" to "assigned to one
//! agronomist". Many agronomists may race on the same consultation; the
//! conditional write guarantees exactly one winner and every loser is told
//! so, never silently overwritten.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::domain::{wait_minutes, Consultation, SenderRole, BOT_SENDER_ID};
use crate::ports::{
    CasOutcome, Clock, ConsultationStore, EngineError, EngineResult, NewMessage, Notifier,
};
use crate::responder::Responder;

/// Resolves accept attempts against the store's conditional-update primitive.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    store: Arc<dyn ConsultationStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl AssignmentCoordinator {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Claims a consultation for `agronomist_id`.
    ///
    /// The transition commits only if the status is still `pending` or
    /// `bot_assisted` at write time. Losing the race yields
    /// `AlreadyAssigned`; a terminal consultation yields `InvalidTransition`.
    /// The wait time is computed once here and persisted with the
    /// assignment. Side effects (handoff chat notice, notification) run
    /// after the commit and never undo it.
    pub async fn accept(
        &self,
        consultation_id: Uuid,
        agronomist_id: Uuid,
        agronomist_name: &str,
    ) -> EngineResult<Consultation> {
        let existing = self.store.get_consultation(consultation_id).await?;

        let now = self.clock.now();
        let wait = wait_minutes(existing.created_at, now);

        let assigned = match self
            .store
            .try_assign(consultation_id, agronomist_id, now, wait)
            .await?
        {
            CasOutcome::Applied(consultation) => consultation,
            CasOutcome::Rejected(current) => {
                return Err(if current.status.is_terminal() {
                    EngineError::InvalidTransition {
                        id: consultation_id,
                        status: current.status,
                    }
                } else {
                    EngineError::AlreadyAssigned(consultation_id)
                });
            }
        };

        // The bot stays a visible participant; it just announces the handoff.
        if assigned.bot_active {
            let notice = NewMessage {
                consultation_id,
                sender_id: BOT_SENDER_ID,
                sender_role: SenderRole::Bot,
                text: Responder::handoff_notice(agronomist_name),
            };
            if let Err(e) = self.store.append_message(notice, self.clock.now()).await {
                warn!(%consultation_id, "Failed to post handoff notice: {e}");
            }
        }

        if let Err(e) = self
            .notifier
            .agronomist_joined(&assigned, agronomist_id, agronomist_name)
            .await
        {
            warn!(%consultation_id, "Assignment notification failed (ignored): {e}");
        }

        Ok(assigned)
    }
}
