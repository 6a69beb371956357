//! Signup handlers and supporting modules.
//!
//! Signup is three calls, each answering `{ "message": ... }`:
//!
//! 1. `POST /api/auth/verify-email` stores a fresh six digit code for the
//!    email (replacing any previous one) and queues it for delivery.
//! 2. `POST /api/auth/validate-code` consumes the code. Only the first
//!    matching, unexpired submission succeeds.
//! 3. `POST /api/auth/register` creates the account for a validated email and
//!    removes the verification record in the same transaction.
//!
//! `GET /api/auth/session` resolves the session cookie to the signed-in user.
//! Sessions are issued by the login flow, not here.

mod memory;
mod postgres;
mod rate_limit;
pub mod register;
pub mod session;
mod state;
mod storage;
pub mod types;
mod utils;
pub mod verification;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub use memory::{MemoryStore, UserAccount};
pub use rate_limit::{
    NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter, WindowRateLimiter,
};
pub use state::{AuthConfig, AuthState};
pub use storage::{Role, Store};

/// Status plus the `{message}` body every signup endpoint answers with.
fn message_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(types::MessageResponse::new(message))).into_response()
}

#[cfg(test)]
mod tests;
