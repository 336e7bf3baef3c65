//! crates/consultation_core/src/test_support.rs
//!
//! In-process fakes for the engine's ports. `MemoryStore` holds its state
//! behind a single mutex, so its conditional updates are genuinely atomic
//! and the race tests exercise the same at-most-one-winner semantics the
//! production store provides.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::{
    CollectionStatus, CommissionSplit, Consultation, ConsultationStatus, Message,
};
use crate::ports::{
    CasOutcome, Clock, ConsultationRequest, ConsultationStore, EngineError, EngineResult,
    NewMessage, Notifier,
};

//=========================================================================================
// MemoryStore
//=========================================================================================

#[derive(Default)]
struct Inner {
    consultations: HashMap<Uuid, Consultation>,
    messages: Vec<Message>,
}

/// A `ConsultationStore` backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only escape hatch: set a status without going through the
    /// conditional-update discipline.
    pub fn set_status_unchecked(&self, id: Uuid, status: ConsultationStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(consultation) = inner.consultations.get_mut(&id) {
            consultation.status = status;
        }
    }
}

fn not_found(id: Uuid) -> EngineError {
    EngineError::NotFound(format!("Consultation {id} not found"))
}

#[async_trait]
impl ConsultationStore for MemoryStore {
    async fn insert_consultation(
        &self,
        request: ConsultationRequest,
        split: CommissionSplit,
        at: DateTime<Utc>,
    ) -> EngineResult<Consultation> {
        let consultation = Consultation {
            id: Uuid::new_v4(),
            farmer_id: request.farmer_id,
            agronomist_id: None,
            plant_name: request.plant_name,
            symptoms: request.symptoms,
            diagnosis: request.diagnosis,
            image_urls: request.image_urls,
            region: request.region,
            season: request.season,
            status: ConsultationStatus::Pending,
            bot_active: false,
            bot_activated_at: None,
            assigned_at: None,
            wait_time_minutes: None,
            amount: request.amount,
            platform_share: split.platform_share,
            agronomist_share: split.agronomist_share,
            collection_status: CollectionStatus::Pending,
            collected_at: None,
            rating: None,
            feedback: None,
            effectiveness: None,
            created_at: at,
            completed_at: None,
        };
        let mut inner = self.inner.lock().unwrap();
        inner
            .consultations
            .insert(consultation.id, consultation.clone());
        Ok(consultation)
    }

    async fn get_consultation(&self, id: Uuid) -> EngineResult<Consultation> {
        let inner = self.inner.lock().unwrap();
        inner
            .consultations
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list_pending(&self) -> EngineResult<Vec<Consultation>> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<Consultation> = inner
            .consultations
            .values()
            .filter(|c| c.status == ConsultationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|c| (c.created_at, c.id));
        Ok(pending)
    }

    async fn list_for_farmer(&self, farmer_id: Uuid) -> EngineResult<Vec<Consultation>> {
        let inner = self.inner.lock().unwrap();
        let mut own: Vec<Consultation> = inner
            .consultations
            .values()
            .filter(|c| c.farmer_id == farmer_id)
            .cloned()
            .collect();
        own.sort_by_key(|c| std::cmp::Reverse((c.created_at, c.id)));
        Ok(own)
    }

    async fn list_active_for_agronomist(
        &self,
        agronomist_id: Uuid,
    ) -> EngineResult<Vec<Consultation>> {
        let inner = self.inner.lock().unwrap();
        let mut active: Vec<Consultation> = inner
            .consultations
            .values()
            .filter(|c| c.agronomist_id == Some(agronomist_id) && c.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|c| std::cmp::Reverse(c.assigned_at));
        Ok(active)
    }

    async fn try_assign(
        &self,
        id: Uuid,
        agronomist_id: Uuid,
        at: DateTime<Utc>,
        wait_time_minutes: i64,
    ) -> EngineResult<CasOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let consultation = inner.consultations.get_mut(&id).ok_or_else(|| not_found(id))?;
        match consultation.status {
            ConsultationStatus::Pending | ConsultationStatus::BotAssisted => {
                consultation.status = ConsultationStatus::Assigned;
                consultation.agronomist_id = Some(agronomist_id);
                consultation.assigned_at = Some(at);
                consultation.wait_time_minutes = Some(wait_time_minutes);
                Ok(CasOutcome::Applied(consultation.clone()))
            }
            _ => Ok(CasOutcome::Rejected(consultation.clone())),
        }
    }

    async fn try_activate_bot(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<CasOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let consultation = inner.consultations.get_mut(&id).ok_or_else(|| not_found(id))?;
        if consultation.status == ConsultationStatus::Pending {
            consultation.status = ConsultationStatus::BotAssisted;
            consultation.bot_active = true;
            consultation.bot_activated_at = Some(at);
            Ok(CasOutcome::Applied(consultation.clone()))
        } else {
            Ok(CasOutcome::Rejected(consultation.clone()))
        }
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: &[ConsultationStatus],
        to: ConsultationStatus,
        at: DateTime<Utc>,
    ) -> EngineResult<CasOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let consultation = inner.consultations.get_mut(&id).ok_or_else(|| not_found(id))?;
        if from.contains(&consultation.status) {
            consultation.status = to;
            if to == ConsultationStatus::Completed {
                consultation.completed_at = Some(at);
            }
            Ok(CasOutcome::Applied(consultation.clone()))
        } else {
            Ok(CasOutcome::Rejected(consultation.clone()))
        }
    }

    async fn record_rating(
        &self,
        id: Uuid,
        rating: i16,
        feedback: Option<String>,
        effectiveness: i16,
    ) -> EngineResult<Consultation> {
        let mut inner = self.inner.lock().unwrap();
        let consultation = inner.consultations.get_mut(&id).ok_or_else(|| not_found(id))?;
        consultation.rating = Some(rating);
        consultation.feedback = feedback;
        consultation.effectiveness = Some(effectiveness);
        Ok(consultation.clone())
    }

    async fn mark_collected(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<CasOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let consultation = inner.consultations.get_mut(&id).ok_or_else(|| not_found(id))?;
        if consultation.status == ConsultationStatus::Completed {
            consultation.collection_status = CollectionStatus::Collected;
            consultation.collected_at.get_or_insert(at);
            Ok(CasOutcome::Applied(consultation.clone()))
        } else {
            Ok(CasOutcome::Rejected(consultation.clone()))
        }
    }

    async fn append_message(
        &self,
        message: NewMessage,
        at: DateTime<Utc>,
    ) -> EngineResult<Message> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.consultations.contains_key(&message.consultation_id) {
            return Err(not_found(message.consultation_id));
        }
        let stored = Message {
            id: Uuid::new_v4(),
            consultation_id: message.consultation_id,
            sender_id: message.sender_id,
            sender_role: message.sender_role,
            text: message.text,
            is_read: false,
            created_at: at,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, consultation_id: Uuid) -> EngineResult<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.consultation_id == consultation_id)
            .cloned()
            .collect();
        // Stable sort: equal timestamps keep insertion order.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_messages_read(
        &self,
        consultation_id: Uuid,
        reader_id: Uuid,
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| m.consultation_id == consultation_id && m.sender_id != reader_id)
        {
            message.is_read = true;
        }
        Ok(())
    }
}

//=========================================================================================
// ManualClock and RecordingNotifier
//=========================================================================================

/// A clock tests advance by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Counts notification events; can be told to fail to prove deliveries are
/// best-effort.
#[derive(Default)]
pub struct RecordingNotifier {
    joined: AtomicUsize,
    bot: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn joined_events(&self) -> usize {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn bot_events(&self) -> usize {
        self.bot.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn agronomist_joined(
        &self,
        _consultation: &Consultation,
        _agronomist_id: Uuid,
        _agronomist_name: &str,
    ) -> EngineResult<()> {
        if self.failing.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Unavailable("notifier offline".into()));
        }
        self.joined.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn bot_activated(&self, _consultation: &Consultation) -> EngineResult<()> {
        if self.failing.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Unavailable("notifier offline".into()));
        }
        self.bot.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//=========================================================================================
// Fixtures
//=========================================================================================

pub mod fixtures {
    use super::*;

    /// A typical submission.
    pub fn request() -> ConsultationRequest {
        ConsultationRequest {
            farmer_id: Uuid::new_v4(),
            plant_name: "Tomato".to_string(),
            symptoms: "Yellowing leaves with brown spots".to_string(),
            diagnosis: Some("Early Blight".to_string()),
            image_urls: vec!["https://img.example/leaf.jpg".to_string()],
            region: "North".to_string(),
            season: "Monsoon".to_string(),
            amount: 199,
        }
    }

    /// A standalone consultation for pure-function tests.
    pub fn consultation() -> Consultation {
        let r = request();
        Consultation {
            id: Uuid::new_v4(),
            farmer_id: r.farmer_id,
            agronomist_id: None,
            plant_name: r.plant_name,
            symptoms: r.symptoms,
            diagnosis: r.diagnosis,
            image_urls: r.image_urls,
            region: r.region,
            season: r.season,
            status: ConsultationStatus::BotAssisted,
            bot_active: true,
            bot_activated_at: None,
            assigned_at: None,
            wait_time_minutes: None,
            amount: r.amount,
            platform_share: 60,
            agronomist_share: 139,
            collection_status: CollectionStatus::Pending,
            collected_at: None,
            rating: None,
            feedback: None,
            effectiveness: None,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    /// Shortcut for arranging a status without the transition discipline.
    pub fn force_status(store: &MemoryStore, id: Uuid, status: ConsultationStatus) {
        store.set_status_unchecked(id, status);
    }
}
