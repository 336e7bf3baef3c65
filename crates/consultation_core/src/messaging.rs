//! crates/consultation_core/src/messaging.rs
//!
//! Message posting for consultation chats. When the automated assistant is
//! handling a consultation, every farmer message gets an immediate bot
//! reply; the first agronomist message moves an assignment into progress.

use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{
    ConsultationStatus, Message, SenderRole, BOT_SENDER_ID, MAX_MESSAGE_LEN,
};
use crate::ports::{Clock, ConsultationStore, EngineError, EngineResult, NewMessage};
use crate::responder::Responder;

/// Appends chat messages and drives the bot side of the conversation.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ConsultationStore>,
    responder: Responder,
    clock: Arc<dyn Clock>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        responder: Responder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            responder,
            clock,
        }
    }

    /// Appends `text` from `sender_id` to the consultation's history.
    ///
    /// The sender must be a participant: the farmer, the assigned
    /// agronomist, or the reserved bot identity. On a bot-assisted
    /// consultation a farmer message also produces an automated reply; a
    /// reply failure is logged, never surfaced, and the farmer's message
    /// stays persisted.
    pub async fn post_message(
        &self,
        consultation_id: Uuid,
        sender_id: Uuid,
        text: String,
    ) -> EngineResult<Message> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation("message text is required".into()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(EngineError::Validation(format!(
                "message text exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }

        let consultation = self.store.get_consultation(consultation_id).await?;
        let sender_role = if sender_id == consultation.farmer_id {
            SenderRole::Farmer
        } else if consultation.agronomist_id == Some(sender_id) {
            SenderRole::Agronomist
        } else if sender_id == BOT_SENDER_ID {
            SenderRole::Bot
        } else {
            return Err(EngineError::Validation(
                "sender is not a participant in this consultation".into(),
            ));
        };

        let message = self
            .store
            .append_message(
                NewMessage {
                    consultation_id,
                    sender_id,
                    sender_role,
                    text: text.clone(),
                },
                self.clock.now(),
            )
            .await?;

        match sender_role {
            SenderRole::Farmer if consultation.status == ConsultationStatus::BotAssisted => {
                let reply = self.responder.respond(&consultation, &text).await;
                let bot_message = NewMessage {
                    consultation_id,
                    sender_id: BOT_SENDER_ID,
                    sender_role: SenderRole::Bot,
                    text: reply,
                };
                if let Err(e) = self.store.append_message(bot_message, self.clock.now()).await {
                    error!(%consultation_id, "Failed to persist bot reply: {e}");
                }
            }
            SenderRole::Agronomist if consultation.status == ConsultationStatus::Assigned => {
                // First agronomist message moves the consultation into
                // progress. Losing this race to a cancel is fine.
                if let Err(e) = self
                    .store
                    .try_transition(
                        consultation_id,
                        &[ConsultationStatus::Assigned],
                        ConsultationStatus::InProgress,
                        self.clock.now(),
                    )
                    .await
                {
                    warn!(%consultation_id, "Could not mark consultation in progress: {e}");
                }
            }
            _ => {}
        }

        Ok(message)
    }

    /// The consultation's history, oldest first, marking everything the
    /// reader had not yet seen as read.
    pub async fn history(
        &self,
        consultation_id: Uuid,
        reader_id: Uuid,
    ) -> EngineResult<Vec<Message>> {
        self.store
            .mark_messages_read(consultation_id, reader_id)
            .await?;
        self.store.list_messages(consultation_id).await
    }
}
