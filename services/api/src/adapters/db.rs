//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `ConsultationStore` port from the core crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.
//!
//! Every status transition is a single `UPDATE ... WHERE status = ...`
//! statement, so the guard and the field writes commit atomically. Zero
//! updated rows for an id that exists means the guard failed, and the caller
//! receives the row as it actually is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use consultation_core::domain::{
    CollectionStatus, CommissionSplit, Consultation, ConsultationStatus, Message, SenderRole,
};
use consultation_core::ports::{
    CasOutcome, ConsultationRequest, ConsultationStore, EngineError, EngineResult, NewMessage,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Column list shared by every query that reads a full consultation row.
const CONSULTATION_COLUMNS: &str = "id, farmer_id, agronomist_id, plant_name, symptoms, \
     diagnosis, image_urls, region, season, status, bot_active, bot_activated_at, \
     assigned_at, wait_time_minutes, amount, platform_share, agronomist_share, \
     collection_status, collected_at, rating, feedback, effectiveness, created_at, \
     completed_at";

const MESSAGE_COLUMNS: &str =
    "id, consultation_id, sender_id, sender_role, text, is_read, created_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ConsultationStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Re-reads a row after a failed conditional update so the caller can
    /// tell "guard failed" apart from "no such consultation".
    async fn rejected(&self, id: Uuid) -> EngineResult<CasOutcome> {
        let current = self.get_consultation(id).await?;
        Ok(CasOutcome::Rejected(current))
    }
}

fn db_error(e: sqlx::Error) -> EngineError {
    EngineError::Unavailable(e.to_string())
}

fn corrupt(field: &str, value: &str) -> EngineError {
    EngineError::Unavailable(format!("Corrupt {field} value in database: '{value}'"))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ConsultationRecord {
    id: Uuid,
    farmer_id: Uuid,
    agronomist_id: Option<Uuid>,
    plant_name: String,
    symptoms: String,
    diagnosis: Option<String>,
    image_urls: Vec<String>,
    region: String,
    season: String,
    status: String,
    bot_active: bool,
    bot_activated_at: Option<DateTime<Utc>>,
    assigned_at: Option<DateTime<Utc>>,
    wait_time_minutes: Option<i64>,
    amount: i64,
    platform_share: i64,
    agronomist_share: i64,
    collection_status: String,
    collected_at: Option<DateTime<Utc>>,
    rating: Option<i16>,
    feedback: Option<String>,
    effectiveness: Option<i16>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ConsultationRecord {
    fn to_domain(self) -> EngineResult<Consultation> {
        let status = ConsultationStatus::parse(&self.status)
            .ok_or_else(|| corrupt("status", &self.status))?;
        let collection_status = CollectionStatus::parse(&self.collection_status)
            .ok_or_else(|| corrupt("collection_status", &self.collection_status))?;
        Ok(Consultation {
            id: self.id,
            farmer_id: self.farmer_id,
            agronomist_id: self.agronomist_id,
            plant_name: self.plant_name,
            symptoms: self.symptoms,
            diagnosis: self.diagnosis,
            image_urls: self.image_urls,
            region: self.region,
            season: self.season,
            status,
            bot_active: self.bot_active,
            bot_activated_at: self.bot_activated_at,
            assigned_at: self.assigned_at,
            wait_time_minutes: self.wait_time_minutes,
            amount: self.amount,
            platform_share: self.platform_share,
            agronomist_share: self.agronomist_share,
            collection_status,
            collected_at: self.collected_at,
            rating: self.rating,
            feedback: self.feedback,
            effectiveness: self.effectiveness,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    consultation_id: Uuid,
    sender_id: Uuid,
    sender_role: String,
    text: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl MessageRecord {
    fn to_domain(self) -> EngineResult<Message> {
        let sender_role = SenderRole::parse(&self.sender_role)
            .ok_or_else(|| corrupt("sender_role", &self.sender_role))?;
        Ok(Message {
            id: self.id,
            consultation_id: self.consultation_id,
            sender_id: self.sender_id,
            sender_role,
            text: self.text,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `ConsultationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConsultationStore for DbAdapter {
    async fn insert_consultation(
        &self,
        request: ConsultationRequest,
        split: CommissionSplit,
        at: DateTime<Utc>,
    ) -> EngineResult<Consultation> {
        let record = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "INSERT INTO consultations \
             (id, farmer_id, plant_name, symptoms, diagnosis, image_urls, region, season, \
              status, amount, platform_share, agronomist_share, collection_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11, 'pending', $12) \
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.farmer_id)
        .bind(&request.plant_name)
        .bind(&request.symptoms)
        .bind(&request.diagnosis)
        .bind(&request.image_urls)
        .bind(&request.region)
        .bind(&request.season)
        .bind(request.amount)
        .bind(split.platform_share)
        .bind(split.agronomist_share)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        record.to_domain()
    }

    async fn get_consultation(&self, id: Uuid) -> EngineResult<Consultation> {
        let record = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EngineError::NotFound(format!("Consultation {id} not found")))?;
        record.to_domain()
    }

    async fn list_pending(&self) -> EngineResult<Vec<Consultation>> {
        let records = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations \
             WHERE status = 'pending' ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_for_farmer(&self, farmer_id: Uuid) -> EngineResult<Vec<Consultation>> {
        let records = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations \
             WHERE farmer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(farmer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_active_for_agronomist(
        &self,
        agronomist_id: Uuid,
    ) -> EngineResult<Vec<Consultation>> {
        let records = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "SELECT {CONSULTATION_COLUMNS} FROM consultations \
             WHERE agronomist_id = $1 AND status IN ('assigned', 'in_progress') \
             ORDER BY assigned_at DESC"
        ))
        .bind(agronomist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn try_assign(
        &self,
        id: Uuid,
        agronomist_id: Uuid,
        at: DateTime<Utc>,
        wait_time_minutes: i64,
    ) -> EngineResult<CasOutcome> {
        let updated = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "UPDATE consultations \
             SET status = 'assigned', agronomist_id = $2, assigned_at = $3, \
                 wait_time_minutes = $4 \
             WHERE id = $1 AND status IN ('pending', 'bot_assisted') \
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(id)
        .bind(agronomist_id)
        .bind(at)
        .bind(wait_time_minutes)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match updated {
            Some(record) => Ok(CasOutcome::Applied(record.to_domain()?)),
            None => self.rejected(id).await,
        }
    }

    async fn try_activate_bot(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<CasOutcome> {
        let updated = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "UPDATE consultations \
             SET status = 'bot_assisted', bot_active = TRUE, bot_activated_at = $2 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match updated {
            Some(record) => Ok(CasOutcome::Applied(record.to_domain()?)),
            None => self.rejected(id).await,
        }
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: &[ConsultationStatus],
        to: ConsultationStatus,
        at: DateTime<Utc>,
    ) -> EngineResult<CasOutcome> {
        let from_names: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let completed_at = (to == ConsultationStatus::Completed).then_some(at);

        let updated = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "UPDATE consultations \
             SET status = $2, completed_at = COALESCE($3, completed_at) \
             WHERE id = $1 AND status = ANY($4) \
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(id)
        .bind(to.as_str())
        .bind(completed_at)
        .bind(&from_names)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match updated {
            Some(record) => Ok(CasOutcome::Applied(record.to_domain()?)),
            None => self.rejected(id).await,
        }
    }

    async fn record_rating(
        &self,
        id: Uuid,
        rating: i16,
        feedback: Option<String>,
        effectiveness: i16,
    ) -> EngineResult<Consultation> {
        let record = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "UPDATE consultations SET rating = $2, feedback = $3, effectiveness = $4 \
             WHERE id = $1 RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(id)
        .bind(rating)
        .bind(&feedback)
        .bind(effectiveness)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EngineError::NotFound(format!("Consultation {id} not found")))?;
        record.to_domain()
    }

    async fn mark_collected(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<CasOutcome> {
        // COALESCE keeps the original stamp, so a repeated call is a no-op.
        let updated = sqlx::query_as::<_, ConsultationRecord>(&format!(
            "UPDATE consultations \
             SET collection_status = 'collected', collected_at = COALESCE(collected_at, $2) \
             WHERE id = $1 AND status = 'completed' \
             RETURNING {CONSULTATION_COLUMNS}"
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match updated {
            Some(record) => Ok(CasOutcome::Applied(record.to_domain()?)),
            None => self.rejected(id).await,
        }
    }

    async fn append_message(
        &self,
        message: NewMessage,
        at: DateTime<Utc>,
    ) -> EngineResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages (id, consultation_id, sender_id, sender_role, text, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(message.consultation_id)
        .bind(message.sender_id)
        .bind(message.sender_role.as_str())
        .bind(&message.text)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        record.to_domain()
    }

    async fn list_messages(&self, consultation_id: Uuid) -> EngineResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE consultation_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(consultation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn mark_messages_read(
        &self,
        consultation_id: Uuid,
        reader_id: Uuid,
    ) -> EngineResult<()> {
        sqlx::query(
            "UPDATE messages SET is_read = TRUE \
             WHERE consultation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(consultation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
