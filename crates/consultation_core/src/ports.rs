//! crates/consultation_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases
//! or reply-generation backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    CommissionSplit, Consultation, ConsultationStatus, Message, SenderRole,
};

//=========================================================================================
// Engine Error and Result Types
//=========================================================================================

/// The error type shared by every engine operation.
///
/// `InvalidTransition` and `AlreadyAssigned` are expected, recoverable
/// outcomes surfaced to the caller for user-facing messaging; `Unavailable`
/// is a real dependency failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Consultation {id} is {status} and cannot make this transition")]
    InvalidTransition {
        id: Uuid,
        status: ConsultationStatus,
    },

    #[error("Consultation {0} was already taken by another agronomist")]
    AlreadyAssigned(Uuid),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Dependency unavailable: {0}")]
    Unavailable(String),
}

/// A convenience type alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;

//=========================================================================================
// Conditional-Update Primitive
//=========================================================================================

/// The result of an atomic conditional write on a consultation's status.
///
/// Every status transition goes through a compare-and-swap on the current
/// status. The guard either holds at commit time and the write applies, or it
/// fails and the caller receives the row as it actually was, so it can decide
/// between "lost the race" and "the state machine forbids this".
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The guard held and the update was committed.
    Applied(Consultation),
    /// The guard failed; carries the consultation as it was at commit time.
    Rejected(Consultation),
}

//=========================================================================================
// Store Input Types
//=========================================================================================

/// A validated submission, ready to be persisted as a `pending` consultation.
#[derive(Debug, Clone)]
pub struct ConsultationRequest {
    pub farmer_id: Uuid,
    pub plant_name: String,
    pub symptoms: String,
    pub diagnosis: Option<String>,
    pub image_urls: Vec<String>,
    pub region: String,
    pub season: String,
    pub amount: i64,
}

/// A chat message to append to a consultation's history.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub consultation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: SenderRole,
    pub text: String,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable record of every consultation and its status history.
///
/// The `try_*` methods are single atomic conditional writes: the status guard
/// and the field updates commit together or not at all. Two concurrent
/// callers racing on the same consultation resolve to exactly one
/// `Applied`; the loser observes `Rejected` with the committed row.
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    async fn insert_consultation(
        &self,
        request: ConsultationRequest,
        split: CommissionSplit,
        at: DateTime<Utc>,
    ) -> EngineResult<Consultation>;

    async fn get_consultation(&self, id: Uuid) -> EngineResult<Consultation>;

    /// All `pending` consultations, oldest first. Ties on the creation
    /// timestamp are broken by id so the order is total and stable.
    async fn list_pending(&self) -> EngineResult<Vec<Consultation>>;

    /// A farmer's own consultations, newest first.
    async fn list_for_farmer(&self, farmer_id: Uuid) -> EngineResult<Vec<Consultation>>;

    /// An agronomist's assigned/in-progress consultations, most recently
    /// accepted first.
    async fn list_active_for_agronomist(
        &self,
        agronomist_id: Uuid,
    ) -> EngineResult<Vec<Consultation>>;

    /// Guard: status is `pending` or `bot_assisted`. On success sets status
    /// to `assigned`, the agronomist, `assigned_at`, and the wait time.
    async fn try_assign(
        &self,
        id: Uuid,
        agronomist_id: Uuid,
        at: DateTime<Utc>,
        wait_time_minutes: i64,
    ) -> EngineResult<CasOutcome>;

    /// Guard: status is `pending`. On success sets status to `bot_assisted`,
    /// `bot_active`, and `bot_activated_at`.
    async fn try_activate_bot(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<CasOutcome>;

    /// Guard: status is one of `from`. On success sets status to `to`
    /// (and `completed_at` when `to` is `completed`).
    async fn try_transition(
        &self,
        id: Uuid,
        from: &[ConsultationStatus],
        to: ConsultationStatus,
        at: DateTime<Utc>,
    ) -> EngineResult<CasOutcome>;

    async fn record_rating(
        &self,
        id: Uuid,
        rating: i16,
        feedback: Option<String>,
        effectiveness: i16,
    ) -> EngineResult<Consultation>;

    /// Guard: status is `completed`. Sets `collection_status` to `collected`
    /// and stamps `collected_at` only if it is not already set, so a repeated
    /// call is a no-op success.
    async fn mark_collected(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<CasOutcome>;

    async fn append_message(&self, message: NewMessage, at: DateTime<Utc>)
        -> EngineResult<Message>;

    /// A consultation's messages, oldest first.
    async fn list_messages(&self, consultation_id: Uuid) -> EngineResult<Vec<Message>>;

    /// Flags every message not authored by `reader_id` as read.
    async fn mark_messages_read(&self, consultation_id: Uuid, reader_id: Uuid)
        -> EngineResult<()>;
}

/// External reply-generation backend (an LLM). Optional: when absent or
/// failing, the responder falls back to its rule-based templates.
#[async_trait]
pub trait ReplyGeneration: Send + Sync {
    async fn generate_reply(
        &self,
        consultation: &Consultation,
        incoming: &str,
    ) -> EngineResult<String>;
}

/// Delivery of user-facing notifications (assignment made, bot activated).
/// Best-effort: a delivery failure must never fail the state transition that
/// triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn agronomist_joined(
        &self,
        consultation: &Consultation,
        agronomist_id: Uuid,
        agronomist_name: &str,
    ) -> EngineResult<()>;

    async fn bot_activated(&self, consultation: &Consultation) -> EngineResult<()>;
}

/// Time source for wait-time and fallback-trigger calculations. Abstracted so
/// tests can drive the clock by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
