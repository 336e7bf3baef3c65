//! crates/consultation_core/src/fallback.rs
//!
//! Watches the age of pending consultations and hands the conversation to
//! the automated assistant once a farmer has waited past the threshold with
//! no human accept. Driven by a recurring scan, not per-item timers.

use std::sync::Arc;

use chrono::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Consultation, ConsultationStatus, SenderRole, BOT_SENDER_ID};
use crate::ports::{
    CasOutcome, Clock, ConsultationStore, EngineError, EngineResult, NewMessage, Notifier,
};
use crate::responder::Responder;

/// Activates the automated assistant for consultations nobody has accepted.
#[derive(Clone)]
pub struct FallbackActivator {
    store: Arc<dyn ConsultationStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    threshold: Duration,
}

impl FallbackActivator {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        threshold: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            threshold,
        }
    }

    /// True once the consultation has been `pending` for at least the
    /// threshold. Advisory only: `activate` re-checks atomically.
    pub async fn should_activate(&self, consultation_id: Uuid) -> EngineResult<bool> {
        let consultation = self.store.get_consultation(consultation_id).await?;
        if consultation.status != ConsultationStatus::Pending {
            return Ok(false);
        }
        Ok(self.clock.now() - consultation.created_at >= self.threshold)
    }

    /// Hands the consultation to the bot, if no human has claimed it.
    ///
    /// The transition commits only if the status is still `pending` at write
    /// time; when a human already won the race (or the bot is already
    /// active), this is a no-op success that never overwrites the existing
    /// assignment. Terminal consultations are refused. The welcome message
    /// and notification happen after the commit.
    pub async fn activate(&self, consultation_id: Uuid) -> EngineResult<Consultation> {
        let activated = match self
            .store
            .try_activate_bot(consultation_id, self.clock.now())
            .await?
        {
            CasOutcome::Applied(consultation) => consultation,
            CasOutcome::Rejected(current) => {
                if current.status.is_terminal() {
                    return Err(EngineError::InvalidTransition {
                        id: consultation_id,
                        status: current.status,
                    });
                }
                return Ok(current);
            }
        };

        let welcome = NewMessage {
            consultation_id,
            sender_id: BOT_SENDER_ID,
            sender_role: SenderRole::Bot,
            text: Responder::welcome_message(&activated),
        };
        if let Err(e) = self.store.append_message(welcome, self.clock.now()).await {
            error!(%consultation_id, "Failed to persist bot welcome message: {e}");
        }

        if let Err(e) = self.notifier.bot_activated(&activated).await {
            warn!(%consultation_id, "Bot-activation notification failed (ignored): {e}");
        }

        info!(%consultation_id, "Automated assistant activated");
        Ok(activated)
    }

    /// One pass over the pending queue: activates the bot on every
    /// consultation past the threshold. Returns how many activations
    /// committed. Works from a snapshot; each activation re-checks via the
    /// conditional write, so racing accepts are harmless.
    pub async fn scan_once(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        let pending = self.store.list_pending().await?;

        let mut activated = 0;
        for consultation in pending {
            if now - consultation.created_at < self.threshold {
                continue;
            }
            match self.activate(consultation.id).await {
                Ok(c) if c.status == ConsultationStatus::BotAssisted => activated += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(consultation_id = %consultation.id, "Fallback activation failed: {e}")
                }
            }
        }
        Ok(activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::AssignmentCoordinator;
    use crate::ledger::commission_split;
    use crate::test_support::{fixtures, ManualClock, MemoryStore, RecordingNotifier};

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        activator: FallbackActivator,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let activator = FallbackActivator::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            Duration::minutes(2),
        );
        Harness {
            store,
            clock,
            notifier,
            activator,
        }
    }

    async fn submit(h: &Harness) -> Uuid {
        h.store
            .insert_consultation(fixtures::request(), commission_split(199), h.clock.now())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn not_eligible_before_the_threshold() {
        let h = harness();
        let id = submit(&h).await;

        h.clock.advance(Duration::seconds(119));
        assert!(!h.activator.should_activate(id).await.unwrap());

        h.clock.advance(Duration::seconds(6));
        assert!(h.activator.should_activate(id).await.unwrap());
    }

    #[tokio::test]
    async fn accepted_consultations_are_never_eligible() {
        let h = harness();
        let id = submit(&h).await;
        fixtures::force_status(&h.store, id, ConsultationStatus::Assigned);

        h.clock.advance(Duration::minutes(10));
        assert!(!h.activator.should_activate(id).await.unwrap());
    }

    #[tokio::test]
    async fn activation_sets_bot_state_and_posts_one_welcome() {
        let h = harness();
        let id = submit(&h).await;
        h.clock.advance(Duration::seconds(125));

        let activated = h.activator.activate(id).await.unwrap();
        assert_eq!(activated.status, ConsultationStatus::BotAssisted);
        assert!(activated.bot_active);
        assert_eq!(activated.bot_activated_at, Some(h.clock.now()));

        let messages = h.store.list_messages(id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, BOT_SENDER_ID);
        assert_eq!(messages[0].sender_role, SenderRole::Bot);
        assert_eq!(h.notifier.bot_events(), 1);
    }

    #[tokio::test]
    async fn double_activation_is_a_no_op() {
        let h = harness();
        let id = submit(&h).await;
        h.clock.advance(Duration::seconds(125));

        let first = h.activator.activate(id).await.unwrap();
        let first_stamp = first.bot_activated_at.unwrap();

        h.clock.advance(Duration::minutes(5));
        let second = h.activator.activate(id).await.unwrap();

        assert_eq!(second.bot_activated_at, Some(first_stamp));
        assert_eq!(h.store.list_messages(id).await.unwrap().len(), 1);
        assert_eq!(h.notifier.bot_events(), 1);
    }

    #[tokio::test]
    async fn activation_never_overwrites_an_assignment() {
        let h = harness();
        let id = submit(&h).await;
        let coordinator =
            AssignmentCoordinator::new(h.store.clone(), h.notifier.clone(), h.clock.clone());
        let agronomist = Uuid::new_v4();
        coordinator.accept(id, agronomist, "Dr. Rao").await.unwrap();

        h.clock.advance(Duration::minutes(5));
        let unchanged = h.activator.activate(id).await.unwrap();

        assert_eq!(unchanged.status, ConsultationStatus::Assigned);
        assert_eq!(unchanged.agronomist_id, Some(agronomist));
        assert!(!unchanged.bot_active);
        assert!(h.store.list_messages(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn terminal_consultations_refuse_activation() {
        let h = harness();
        let id = submit(&h).await;
        fixtures::force_status(&h.store, id, ConsultationStatus::Completed);

        let err = h.activator.activate(id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn accept_and_activate_race_resolves_cleanly() {
        for _ in 0..16 {
            let h = harness();
            let id = submit(&h).await;
            let coordinator =
                AssignmentCoordinator::new(h.store.clone(), h.notifier.clone(), h.clock.clone());
            h.clock.advance(Duration::seconds(125));

            let accept = {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.accept(id, Uuid::new_v4(), "Racer").await })
            };
            let activate = {
                let activator = h.activator.clone();
                tokio::spawn(async move { activator.activate(id).await })
            };
            let _ = accept.await.unwrap();
            let _ = activate.await.unwrap();

            let settled = h.store.get_consultation(id).await.unwrap();
            // Either the human or the bot won; never a half-written state.
            match settled.status {
                ConsultationStatus::Assigned => {
                    assert!(settled.agronomist_id.is_some());
                }
                ConsultationStatus::BotAssisted => {
                    assert!(settled.agronomist_id.is_none());
                    assert!(settled.bot_active);
                }
                other => panic!("unexpected status after race: {other}"),
            }

            let welcomes = h
                .store
                .list_messages(id)
                .await
                .unwrap()
                .iter()
                .filter(|m| m.text.contains("assistant"))
                .count();
            assert_eq!(welcomes, usize::from(settled.bot_active));
        }
    }

    #[tokio::test]
    async fn scan_activates_only_eligible_consultations() {
        let h = harness();
        let old = submit(&h).await;
        h.clock.advance(Duration::seconds(125));
        let fresh = submit(&h).await;

        let activated = h.activator.scan_once().await.unwrap();
        assert_eq!(activated, 1);
        assert_eq!(
            h.store.get_consultation(old).await.unwrap().status,
            ConsultationStatus::BotAssisted
        );
        assert_eq!(
            h.store.get_consultation(fresh).await.unwrap().status,
            ConsultationStatus::Pending
        );
    }
}
