//! services/api/src/adapters/notify.rs
//!
//! Notification delivery adapter. Actual delivery (email, push) belongs to
//! an external collaborator; this adapter is the seam where it plugs in, and
//! by default it records the event in the service log. Failures here are
//! swallowed by the engine after the state transition has committed.

use async_trait::async_trait;
use consultation_core::{
    domain::Consultation,
    ports::{EngineResult, Notifier},
};
use tracing::info;
use uuid::Uuid;

/// A `Notifier` that writes the event to the log.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn agronomist_joined(
        &self,
        consultation: &Consultation,
        agronomist_id: Uuid,
        agronomist_name: &str,
    ) -> EngineResult<()> {
        info!(
            consultation_id = %consultation.id,
            farmer_id = %consultation.farmer_id,
            %agronomist_id,
            "Notify: agronomist {agronomist_name} joined the consultation"
        );
        Ok(())
    }

    async fn bot_activated(&self, consultation: &Consultation) -> EngineResult<()> {
        info!(
            consultation_id = %consultation.id,
            farmer_id = %consultation.farmer_id,
            "Notify: automated assistant is now handling the consultation"
        );
        Ok(())
    }
}
