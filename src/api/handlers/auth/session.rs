//! Read-only session lookup.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::COOKIE},
    response::IntoResponse,
};
use tracing::error;

use super::{
    storage::Store,
    types::{SessionResponse, SessionUser},
    utils::hash_session_token,
};

pub const SESSION_COOKIE_NAME: &str = "tutorhub_session";

/// Resolve the session cookie to the signed-in user, or `null`.
#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Current user, `null` when signed out", body = SessionResponse)
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, store: Extension<Store>) -> impl IntoResponse {
    match current_user(&headers, &store).await {
        Ok(user) => (StatusCode::OK, Json(SessionResponse { user })).into_response(),
        Err(status) => status.into_response(),
    }
}

/// Resolve the session cookie into the signed-in user, if any.
///
/// # Errors
/// Returns `INTERNAL_SERVER_ERROR` when the store lookup fails.
pub async fn current_user(
    headers: &HeaderMap,
    store: &Store,
) -> Result<Option<SessionUser>, StatusCode> {
    // Missing cookies are treated as "no session".
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    store
        .lookup_session(&hash_session_token(&token))
        .await
        .map_err(|err| {
            error!("Failed to lookup session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}
