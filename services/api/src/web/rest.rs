//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::middleware::Identity;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use consultation_core::{
    domain::{Consultation, Message, QueueEntry},
    ports::{ConsultationRequest, ConsultationStore, EngineError},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_consultation_handler,
        queue_handler,
        my_consultations_handler,
        active_consultations_handler,
        position_handler,
        accept_handler,
        post_message_handler,
        list_messages_handler,
        complete_handler,
        cancel_handler,
        rate_handler,
        collect_handler,
    ),
    components(
        schemas(
            SubmitConsultationRequest,
            SubmitConsultationResponse,
            ConsultationResponse,
            QueueEntryResponse,
            QueuePositionResponse,
            PostMessageRequest,
            MessageResponse,
            RateRequest,
        )
    ),
    tags(
        (name = "Consultation API", description = "Plant-health consultation matching, chat, and settlement.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A consultation submission from a farmer.
#[derive(Deserialize, ToSchema)]
pub struct SubmitConsultationRequest {
    pub plant_name: String,
    pub symptoms: String,
    pub diagnosis: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub region: String,
    pub season: String,
    /// Price supplied by the payment collaborator. Falls back to the
    /// configured default when absent.
    pub amount: Option<i64>,
}

/// A consultation as returned by the API.
#[derive(Serialize, ToSchema)]
pub struct ConsultationResponse {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub agronomist_id: Option<Uuid>,
    pub plant_name: String,
    pub symptoms: String,
    pub diagnosis: Option<String>,
    pub image_urls: Vec<String>,
    pub region: String,
    pub season: String,
    pub status: String,
    pub bot_active: bool,
    pub bot_activated_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub wait_time_minutes: Option<i64>,
    pub amount: i64,
    pub platform_share: i64,
    pub agronomist_share: i64,
    pub collection_status: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub rating: Option<i16>,
    pub feedback: Option<String>,
    pub effectiveness: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Consultation> for ConsultationResponse {
    fn from(c: Consultation) -> Self {
        Self {
            id: c.id,
            farmer_id: c.farmer_id,
            agronomist_id: c.agronomist_id,
            plant_name: c.plant_name,
            symptoms: c.symptoms,
            diagnosis: c.diagnosis,
            image_urls: c.image_urls,
            region: c.region,
            season: c.season,
            status: c.status.as_str().to_string(),
            bot_active: c.bot_active,
            bot_activated_at: c.bot_activated_at,
            assigned_at: c.assigned_at,
            wait_time_minutes: c.wait_time_minutes,
            amount: c.amount,
            platform_share: c.platform_share,
            agronomist_share: c.agronomist_share,
            collection_status: c.collection_status.as_str().to_string(),
            collected_at: c.collected_at,
            rating: c.rating,
            feedback: c.feedback,
            effectiveness: c.effectiveness,
            created_at: c.created_at,
            completed_at: c.completed_at,
        }
    }
}

/// The response payload sent after successfully submitting a consultation.
#[derive(Serialize, ToSchema)]
pub struct SubmitConsultationResponse {
    pub consultation: ConsultationResponse,
    pub queue_position: usize,
    /// Rough estimate: five minutes per consultation ahead in the queue.
    pub estimated_wait_minutes: usize,
}

/// One row of the agronomist-facing queue view.
#[derive(Serialize, ToSchema)]
pub struct QueueEntryResponse {
    pub position: usize,
    pub waiting_minutes: i64,
    pub consultation: ConsultationResponse,
}

impl From<QueueEntry> for QueueEntryResponse {
    fn from(entry: QueueEntry) -> Self {
        Self {
            position: entry.position,
            waiting_minutes: entry.waiting_minutes,
            consultation: entry.consultation.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QueuePositionResponse {
    pub position: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct PostMessageRequest {
    pub text: String,
}

/// A chat message as returned by the API.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: String,
    pub text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            consultation_id: m.consultation_id,
            sender_id: m.sender_id,
            sender_role: m.sender_role.as_str().to_string(),
            text: m.text,
            is_read: m.is_read,
            created_at: m.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RateRequest {
    pub rating: i16,
    pub feedback: Option<String>,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps engine errors to HTTP responses. The transition errors are expected
/// outcomes with user-facing wording; only `Unavailable` is a real failure.
fn engine_error(e: EngineError) -> (StatusCode, String) {
    match e {
        EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        EngineError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        EngineError::AlreadyAssigned(_) => (
            StatusCode::CONFLICT,
            "This consultation has already been taken by another agronomist".to_string(),
        ),
        EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, e.to_string()),
        EngineError::Unavailable(msg) => {
            error!("Dependency unavailable: {msg}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable".to_string(),
            )
        }
    }
}

fn agronomists_only(identity: &Identity) -> Result<(), (StatusCode, String)> {
    if identity.is_agronomist() {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "Only agronomists can perform this action".to_string(),
        ))
    }
}

/// Loads the consultation and checks the caller is its farmer or its
/// assigned agronomist.
async fn require_participant(
    state: &AppState,
    consultation_id: Uuid,
    identity: &Identity,
) -> Result<Consultation, (StatusCode, String)> {
    let consultation = state
        .store
        .get_consultation(consultation_id)
        .await
        .map_err(engine_error)?;
    let is_farmer = consultation.farmer_id == identity.user_id;
    let is_agronomist = consultation.agronomist_id == Some(identity.user_id);
    if is_farmer || is_agronomist {
        Ok(consultation)
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "Not a participant in this consultation".to_string(),
        ))
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Submit a new consultation request.
#[utoipa::path(
    post,
    path = "/consultations",
    request_body = SubmitConsultationRequest,
    responses(
        (status = 201, description = "Consultation queued", body = SubmitConsultationResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn submit_consultation_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SubmitConsultationRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let request = ConsultationRequest {
        farmer_id: identity.user_id,
        plant_name: req.plant_name,
        symptoms: req.symptoms,
        diagnosis: req.diagnosis,
        image_urls: req.image_urls.unwrap_or_default(),
        region: req.region,
        season: req.season,
        amount: req.amount.unwrap_or(state.config.default_amount),
    };

    let consultation = state.lifecycle.submit(request).await.map_err(engine_error)?;
    let queue_position = state.queue.position_of(consultation.id).await.unwrap_or(1);

    let response = SubmitConsultationResponse {
        consultation: consultation.into(),
        queue_position,
        estimated_wait_minutes: queue_position * 5,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// The FIFO queue of pending consultations, for the agronomist dashboard.
#[utoipa::path(
    get,
    path = "/consultations/queue",
    responses(
        (status = 200, description = "Pending consultations, oldest first", body = [QueueEntryResponse]),
        (status = 403, description = "Caller is not an agronomist")
    )
)]
pub async fn queue_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    agronomists_only(&identity)?;
    let entries = state.queue.list_pending().await.map_err(engine_error)?;
    let body: Vec<QueueEntryResponse> = entries.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// The caller's own consultations, newest first.
#[utoipa::path(
    get,
    path = "/consultations/mine",
    responses(
        (status = 200, description = "The caller's consultations", body = [ConsultationResponse])
    )
)]
pub async fn my_consultations_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let consultations = state
        .store
        .list_for_farmer(identity.user_id)
        .await
        .map_err(engine_error)?;
    let body: Vec<ConsultationResponse> = consultations.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// The agronomist's active (assigned or in-progress) consultations.
#[utoipa::path(
    get,
    path = "/consultations/active",
    responses(
        (status = 200, description = "Active consultations", body = [ConsultationResponse]),
        (status = 403, description = "Caller is not an agronomist")
    )
)]
pub async fn active_consultations_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    agronomists_only(&identity)?;
    let consultations = state
        .store
        .list_active_for_agronomist(identity.user_id)
        .await
        .map_err(engine_error)?;
    let body: Vec<ConsultationResponse> = consultations.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// The 1-based queue position of a pending consultation.
#[utoipa::path(
    get,
    path = "/consultations/{id}/position",
    params(("id" = Uuid, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Queue position", body = QueuePositionResponse),
        (status = 404, description = "Not pending or unknown")
    )
)]
pub async fn position_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let position = state.queue.position_of(id).await.map_err(engine_error)?;
    Ok(Json(QueuePositionResponse { position }))
}

/// Accept a consultation. At most one agronomist wins; everyone else gets 409.
#[utoipa::path(
    post,
    path = "/consultations/{id}/accept",
    params(("id" = Uuid, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Consultation assigned to the caller", body = ConsultationResponse),
        (status = 403, description = "Caller is not an agronomist"),
        (status = 404, description = "Unknown consultation"),
        (status = 409, description = "Already taken, completed, or cancelled")
    )
)]
pub async fn accept_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    agronomists_only(&identity)?;
    let name = identity
        .display_name
        .clone()
        .unwrap_or_else(|| "An expert agronomist".to_string());
    let consultation = state
        .coordinator
        .accept(id, identity.user_id, &name)
        .await
        .map_err(engine_error)?;
    Ok(Json(ConsultationResponse::from(consultation)))
}

/// Post a chat message. On a bot-assisted consultation the assistant answers
/// farmer messages immediately.
#[utoipa::path(
    post,
    path = "/consultations/{id}/messages",
    params(("id" = Uuid, Path, description = "Consultation id")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageResponse),
        (status = 400, description = "Blank, overlong, or non-participant message"),
        (status = 404, description = "Unknown consultation")
    )
)]
pub async fn post_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let message = state
        .messages
        .post_message(id, identity.user_id, req.text)
        .await
        .map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

/// The consultation's chat history, oldest first.
#[utoipa::path(
    get,
    path = "/consultations/{id}/messages",
    params(("id" = Uuid, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Chat history", body = [MessageResponse]),
        (status = 403, description = "Caller is not a participant"),
        (status = 404, description = "Unknown consultation")
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_participant(&state, id, &identity).await?;
    let history = state
        .messages
        .history(id, identity.user_id)
        .await
        .map_err(engine_error)?;
    let body: Vec<MessageResponse> = history.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Complete an active consultation.
#[utoipa::path(
    post,
    path = "/consultations/{id}/complete",
    params(("id" = Uuid, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Consultation completed", body = ConsultationResponse),
        (status = 403, description = "Caller is not a participant"),
        (status = 409, description = "Not in an active status")
    )
)]
pub async fn complete_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_participant(&state, id, &identity).await?;
    let consultation = state.lifecycle.complete(id).await.map_err(engine_error)?;
    Ok(Json(ConsultationResponse::from(consultation)))
}

/// Withdraw a consultation. Only the requesting farmer may cancel.
#[utoipa::path(
    post,
    path = "/consultations/{id}/cancel",
    params(("id" = Uuid, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Consultation cancelled", body = ConsultationResponse),
        (status = 403, description = "Caller is not the requesting farmer"),
        (status = 409, description = "Already completed or cancelled")
    )
)]
pub async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let consultation = require_participant(&state, id, &identity).await?;
    if consultation.farmer_id != identity.user_id {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the requesting farmer can cancel".to_string(),
        ));
    }
    let consultation = state.lifecycle.cancel(id).await.map_err(engine_error)?;
    Ok(Json(ConsultationResponse::from(consultation)))
}

/// Rate a consultation 1-5.
#[utoipa::path(
    post,
    path = "/consultations/{id}/rate",
    params(("id" = Uuid, Path, description = "Consultation id")),
    request_body = RateRequest,
    responses(
        (status = 200, description = "Rating stored", body = ConsultationResponse),
        (status = 400, description = "Rating out of range"),
        (status = 403, description = "Caller is not the requesting farmer")
    )
)]
pub async fn rate_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<RateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let consultation = require_participant(&state, id, &identity).await?;
    if consultation.farmer_id != identity.user_id {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the requesting farmer can rate".to_string(),
        ));
    }
    let consultation = state
        .lifecycle
        .rate(id, req.rating, req.feedback)
        .await
        .map_err(engine_error)?;
    Ok(Json(ConsultationResponse::from(consultation)))
}

/// Confirm the agronomist's share of a completed consultation as collected.
/// Idempotent: repeating the call is a no-op success.
#[utoipa::path(
    post,
    path = "/consultations/{id}/collect",
    params(("id" = Uuid, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Share marked collected", body = ConsultationResponse),
        (status = 403, description = "Caller is not the requesting farmer"),
        (status = 409, description = "Consultation is not completed")
    )
)]
pub async fn collect_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let consultation = require_participant(&state, id, &identity).await?;
    if consultation.farmer_id != identity.user_id {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the requesting farmer can confirm collection".to_string(),
        ));
    }
    let consultation = state.ledger.mark_collected(id).await.map_err(engine_error)?;
    Ok(Json(ConsultationResponse::from(consultation)))
}
