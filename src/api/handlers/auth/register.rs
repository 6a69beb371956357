//! Account registration for verified emails.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, info};

use super::message_response;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{RegisterOutcome, Store};
use super::types::{MessageResponse, RegisterRequest};
use super::utils::{extract_client_ip, hash_password};
use crate::validation::{normalize_email, valid_email, valid_password};

/// Create the account for an email whose code was validated.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = MessageResponse),
        (status = 400, description = "Invalid email or password", body = MessageResponse),
        (status = 403, description = "Email not verified", body = MessageResponse),
        (status = 409, description = "Email already registered", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    store: Extension<Store>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email address");
    }
    if !valid_password(&request.password) {
        return message_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters and include a letter",
        );
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return message_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        );
    }

    let password = SecretString::from(request.password);
    let password_hash = match hash_password(password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err:#}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed");
        }
    };

    match store
        .register_user(&email, &password_hash, auth_state.config())
        .await
    {
        Ok(RegisterOutcome::Created(user_id)) => {
            info!(email = %email, %user_id, "account created");
            message_response(StatusCode::OK, "Registration successful!")
        }
        Ok(RegisterOutcome::NotVerified) => {
            message_response(StatusCode::FORBIDDEN, "Email is not verified")
        }
        Ok(RegisterOutcome::Conflict) => {
            message_response(StatusCode::CONFLICT, "Email is already registered")
        }
        Err(err) => {
            error!("Failed to register user: {err:#}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
    }
}
