//! services/api/src/web/middleware.rs
//!
//! Identity extraction for protected routes. Account storage and session
//! validation live in an upstream collaborator; by the time a request gets
//! here that collaborator has stamped the `x-user-*` headers.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Which side of a consultation the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    Farmer,
    Agronomist,
}

/// The authenticated caller, extracted from headers on every request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: CallerRole,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn is_agronomist(&self) -> bool {
        self.role == CallerRole::Agronomist
    }
}

/// Middleware that reads the caller's identity headers.
///
/// `x-user-id` is required; `x-user-role` defaults to `farmer`; the optional
/// `x-user-name` feeds user-facing notices. If the id is missing or invalid,
/// returns 401 Unauthorized.
pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let identity = identity_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())?;

    let role = match headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
        Some("agronomist") => CallerRole::Agronomist,
        _ => CallerRole::Farmer,
    };

    let display_name = headers
        .get("x-user-name")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    Some(Identity {
        user_id,
        role,
        display_name,
    })
}
