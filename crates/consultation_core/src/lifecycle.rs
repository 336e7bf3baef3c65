//! crates/consultation_core/src/lifecycle.rs
//!
//! Submission, completion, cancellation, and rating. These are the
//! farmer-facing edges of the status machine; the contested transitions
//! (accept, bot activation) live in their own modules.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Consultation, ConsultationStatus};
use crate::ledger::commission_split;
use crate::ports::{
    CasOutcome, Clock, ConsultationRequest, ConsultationStore, EngineError, EngineResult,
};

/// Statuses from which the requester may still cancel.
const CANCELLABLE: &[ConsultationStatus] = &[
    ConsultationStatus::Pending,
    ConsultationStatus::BotAssisted,
    ConsultationStatus::Assigned,
    ConsultationStatus::InProgress,
];

/// Statuses from which a consultation can complete.
const COMPLETABLE: &[ConsultationStatus] = &[
    ConsultationStatus::Assigned,
    ConsultationStatus::InProgress,
];

/// Creation and terminal transitions for consultations.
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn ConsultationStore>,
    clock: Arc<dyn Clock>,
}

impl LifecycleService {
    pub fn new(store: Arc<dyn ConsultationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persists a new `pending` consultation. The commission split is
    /// computed here, eagerly, the moment the amount is set.
    pub async fn submit(&self, request: ConsultationRequest) -> EngineResult<Consultation> {
        if request.plant_name.trim().is_empty() {
            return Err(EngineError::Validation("plant_name is required".into()));
        }
        if request.symptoms.trim().is_empty() {
            return Err(EngineError::Validation("symptoms is required".into()));
        }
        if request.region.trim().is_empty() || request.season.trim().is_empty() {
            return Err(EngineError::Validation("region and season are required".into()));
        }
        if request.amount < 0 {
            return Err(EngineError::Validation("amount must not be negative".into()));
        }

        let split = commission_split(request.amount);
        self.store
            .insert_consultation(request, split, self.clock.now())
            .await
    }

    pub async fn complete(&self, id: Uuid) -> EngineResult<Consultation> {
        self.transition(id, COMPLETABLE, ConsultationStatus::Completed)
            .await
    }

    pub async fn cancel(&self, id: Uuid) -> EngineResult<Consultation> {
        self.transition(id, CANCELLABLE, ConsultationStatus::Cancelled)
            .await
    }

    /// Records the farmer's rating and feedback, deriving the 0-100
    /// effectiveness score from the 1-5 rating.
    pub async fn rate(
        &self,
        id: Uuid,
        rating: i16,
        feedback: Option<String>,
    ) -> EngineResult<Consultation> {
        if !(1..=5).contains(&rating) {
            return Err(EngineError::Validation(
                "rating must be between 1 and 5".into(),
            ));
        }
        let effectiveness = rating * 20;
        self.store
            .record_rating(id, rating, feedback, effectiveness)
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[ConsultationStatus],
        to: ConsultationStatus,
    ) -> EngineResult<Consultation> {
        match self
            .store
            .try_transition(id, from, to, self.clock.now())
            .await?
        {
            CasOutcome::Applied(consultation) => Ok(consultation),
            CasOutcome::Rejected(current) => Err(EngineError::InvalidTransition {
                id,
                status: current.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CollectionStatus;
    use crate::test_support::{fixtures, ManualClock, MemoryStore};

    fn service(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> LifecycleService {
        LifecycleService::new(store, clock)
    }

    #[tokio::test]
    async fn submit_creates_a_pending_consultation_with_split() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let lifecycle = service(store, clock.clone());

        let consultation = lifecycle.submit(fixtures::request()).await.unwrap();
        assert_eq!(consultation.status, ConsultationStatus::Pending);
        assert_eq!(consultation.created_at, clock.now());
        assert!(consultation.agronomist_id.is_none());
        assert!(!consultation.bot_active);
        assert_eq!(consultation.amount, 199);
        assert_eq!(consultation.platform_share, 60);
        assert_eq!(consultation.agronomist_share, 139);
        assert_eq!(consultation.collection_status, CollectionStatus::Pending);
    }

    #[tokio::test]
    async fn submit_rejects_missing_fields() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let lifecycle = service(store, clock);

        let mut request = fixtures::request();
        request.symptoms = "   ".to_string();
        let err = lifecycle.submit(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let mut request = fixtures::request();
        request.amount = -1;
        let err = lifecycle.submit(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn pending_consultations_cannot_complete() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let lifecycle = service(store, clock);

        let consultation = lifecycle.submit(fixtures::request()).await.unwrap();
        let err = lifecycle.complete(consultation.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn terminal_statuses_are_immutable() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let lifecycle = service(store.clone(), clock);

        let consultation = lifecycle.submit(fixtures::request()).await.unwrap();
        lifecycle.cancel(consultation.id).await.unwrap();

        let err = lifecycle.cancel(consultation.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        let err = lifecycle.complete(consultation.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn completion_stamps_completed_at() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let lifecycle = service(store.clone(), clock.clone());

        let consultation = lifecycle.submit(fixtures::request()).await.unwrap();
        fixtures::force_status(&store, consultation.id, ConsultationStatus::InProgress);

        clock.advance(chrono::Duration::minutes(20));
        let completed = lifecycle.complete(consultation.id).await.unwrap();
        assert_eq!(completed.status, ConsultationStatus::Completed);
        assert_eq!(completed.completed_at, Some(clock.now()));
    }

    #[tokio::test]
    async fn rating_is_bounded_and_derives_effectiveness() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let lifecycle = service(store, clock);

        let consultation = lifecycle.submit(fixtures::request()).await.unwrap();

        let err = lifecycle.rate(consultation.id, 0, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = lifecycle.rate(consultation.id, 6, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let rated = lifecycle
            .rate(consultation.id, 4, Some("very helpful".to_string()))
            .await
            .unwrap();
        assert_eq!(rated.rating, Some(4));
        assert_eq!(rated.effectiveness, Some(80));
        assert_eq!(rated.feedback.as_deref(), Some("very helpful"));
    }
}
