//! crates/consultation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the consultation engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Reserved sender identity for messages authored by the automated assistant.
/// Never collides with a real user id.
pub const BOT_SENDER_ID: Uuid = Uuid::nil();

/// Maximum accepted length of a chat message, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// The lifecycle status of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsultationStatus {
    /// Waiting in the queue for an agronomist.
    Pending,
    /// An agronomist has claimed the consultation.
    Assigned,
    /// The automated assistant is handling the conversation; no human yet.
    BotAssisted,
    /// The assigned agronomist has started responding.
    InProgress,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// An agronomist is currently attached and working.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::BotAssisted => "bot_assisted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "bot_assisted" => Some(Self::BotAssisted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the agronomist's share of a completed consultation has been paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Pending,
    Collected,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Collected => "collected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "collected" => Some(Self::Collected),
            _ => None,
        }
    }
}

/// The fixed 30/70 division of a consultation's price between the platform
/// and the accepting agronomist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub platform_share: i64,
    pub agronomist_share: i64,
}

/// A farmer's plant-health consultation request and everything that happens
/// to it: queueing, assignment, bot fallback, completion, and payout state.
#[derive(Debug, Clone)]
pub struct Consultation {
    pub id: Uuid,
    pub farmer_id: Uuid,
    /// Set exactly once, by the accept transition.
    pub agronomist_id: Option<Uuid>,

    pub plant_name: String,
    pub symptoms: String,
    /// Diagnosis label carried over from the farmer's prior analysis.
    pub diagnosis: Option<String>,
    pub image_urls: Vec<String>,
    pub region: String,
    pub season: String,

    pub status: ConsultationStatus,

    pub bot_active: bool,
    pub bot_activated_at: Option<DateTime<Utc>>,

    pub assigned_at: Option<DateTime<Utc>>,
    /// Minutes the farmer waited for a human, computed once at assignment.
    pub wait_time_minutes: Option<i64>,

    pub amount: i64,
    pub platform_share: i64,
    pub agronomist_share: i64,
    pub collection_status: CollectionStatus,
    pub collected_at: Option<DateTime<Utc>>,

    pub rating: Option<i16>,
    pub feedback: Option<String>,
    /// 0-100, derived from the rating.
    pub effectiveness: Option<i16>,

    /// Immutable; defines the FIFO order of the queue.
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Consultation {
    /// Human-facing label for what is wrong with the plant, used by the
    /// automated responder's templates.
    pub fn diagnosis_label(&self) -> &str {
        self.diagnosis.as_deref().unwrap_or("the reported condition")
    }
}

/// Wait time in whole minutes between submission and assignment,
/// rounded to the nearest minute.
pub fn wait_minutes(created_at: DateTime<Utc>, assigned_at: DateTime<Utc>) -> i64 {
    ((assigned_at - created_at).num_seconds() as f64 / 60.0).round() as i64
}

/// The author category of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    Farmer,
    Agronomist,
    Bot,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Agronomist => "agronomist",
            Self::Bot => "bot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "farmer" => Some(Self::Farmer),
            "agronomist" => Some(Self::Agronomist),
            "bot" => Some(Self::Bot),
            _ => None,
        }
    }
}

/// A single chat message inside a consultation. Messages are never rewritten
/// or deleted, even after the consultation reaches a terminal status.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: SenderRole,
    pub text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// One row of the derived queue view: a pending consultation with its
/// fairness position (1-based) and how long it has been waiting.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub consultation: Consultation,
    pub position: usize,
    pub waiting_minutes: i64,
}
