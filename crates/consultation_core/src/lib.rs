pub mod assignment;
pub mod domain;
pub mod fallback;
pub mod ledger;
pub mod lifecycle;
pub mod messaging;
pub mod ports;
pub mod queue;
pub mod responder;

#[cfg(test)]
pub(crate) mod test_support;

pub use assignment::AssignmentCoordinator;
pub use domain::{
    CollectionStatus, CommissionSplit, Consultation, ConsultationStatus, Message, QueueEntry,
    SenderRole, BOT_SENDER_ID, MAX_MESSAGE_LEN,
};
pub use fallback::FallbackActivator;
pub use ledger::{commission_split, CommissionLedger};
pub use lifecycle::LifecycleService;
pub use messaging::MessageService;
pub use ports::{
    CasOutcome, Clock, ConsultationRequest, ConsultationStore, EngineError, EngineResult,
    NewMessage, Notifier, ReplyGeneration, SystemClock,
};
pub use queue::QueueManager;
pub use responder::{classify, rule_based_reply, ReplyIntent, Responder};
