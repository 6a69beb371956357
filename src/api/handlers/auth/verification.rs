//! Email verification endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::message_response;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{IssueOutcome, Store};
use super::types::{MessageResponse, ValidateCodeRequest, VerifyEmailRequest};
use super::utils::{
    VERIFICATION_CODE_DIGITS, extract_client_ip, generate_verification_code,
    hash_verification_code,
};
use crate::api::email::{EmailMessage, VERIFICATION_CODE_TEMPLATE};
use crate::validation::{normalize_email, valid_email};

const RATE_LIMITED: &str = "Too many requests. Please try again later.";

fn rate_limited(
    auth_state: &AuthState,
    headers: &HeaderMap,
    email: &str,
    action: RateLimitAction,
) -> bool {
    let client_ip = extract_client_ip(headers);
    auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), action)
        == RateLimitDecision::Limited
        || auth_state.rate_limiter().check_email(email, action) == RateLimitDecision::Limited
}

/// Issue a fresh verification code for the email and queue it for delivery.
#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Code issued and queued", body = MessageResponse),
        (status = 400, description = "Malformed email", body = MessageResponse),
        (status = 409, description = "Email already registered", body = MessageResponse),
        (status = 429, description = "Rate limited or resend cooldown active", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    store: Extension<Store>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email address");
    }

    // Limits apply before any code is generated or stored.
    if rate_limited(&auth_state, &headers, &email, RateLimitAction::VerifyEmail) {
        return message_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED);
    }

    // Queue capacity first: a code is only stored once its email can be sent.
    let slot = match auth_state.outbox().reserve() {
        Ok(slot) => slot,
        Err(err) => {
            error!("Failed to queue verification email: {err:#}");
            return message_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to send verification code",
            );
        }
    };

    let code = generate_verification_code();
    let code_hash = hash_verification_code(&email, &code);
    let config = auth_state.config();

    match store.issue_verification(&email, &code_hash, config).await {
        Ok(IssueOutcome::Issued) => {}
        Ok(IssueOutcome::AlreadyRegistered) => {
            return message_response(StatusCode::CONFLICT, "Email is already registered");
        }
        Ok(IssueOutcome::Cooldown) => {
            return message_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Please wait before requesting another code",
            );
        }
        Err(err) => {
            error!("Failed to issue verification code: {err:#}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send verification code",
            );
        }
    }

    slot.send(EmailMessage {
        to_email: email.clone(),
        template: VERIFICATION_CODE_TEMPLATE.to_string(),
        payload_json: json!({
            "email": email,
            "code": code,
            "expires_in_seconds": config.email_token_ttl_seconds(),
        })
        .to_string(),
    });

    info!(email = %email, "verification code issued");
    message_response(StatusCode::OK, "Verification code sent to email.")
}

/// Consume the code for the email. Only the first matching submission succeeds.
#[utoipa::path(
    post,
    path = "/api/auth/validate-code",
    request_body = ValidateCodeRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Missing, expired, or mismatched code", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn validate_code(
    headers: HeaderMap,
    store: Extension<Store>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ValidateCodeRequest>>,
) -> impl IntoResponse {
    let request: ValidateCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    let token = request.token.trim();
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email address");
    }
    if token.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Missing verification code");
    }

    if rate_limited(&auth_state, &headers, &email, RateLimitAction::ValidateCode) {
        return message_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED);
    }

    // Codes never have another shape, skip the store round trip.
    if token.len() != VERIFICATION_CODE_DIGITS || !token.bytes().all(|b| b.is_ascii_digit()) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid or expired token.");
    }

    let code_hash = hash_verification_code(&email, token);
    match store.consume_verification(&email, &code_hash).await {
        Ok(true) => {
            info!(email = %email, "email verified");
            message_response(StatusCode::OK, "Email verified successfully!")
        }
        Ok(false) => message_response(StatusCode::BAD_REQUEST, "Invalid or expired token."),
        Err(err) => {
            error!("Failed to validate verification code: {err:#}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Verification failed")
        }
    }
}
