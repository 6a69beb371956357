//! # Tutorhub (signup & email verification)
//!
//! `tutorhub` carries the account-creation slice of the tutor marketplace:
//!
//! - [`api`]: an axum service exposing the verification and registration
//!   endpoints (`/api/auth/verify-email`, `/api/auth/validate-code`,
//!   `/api/auth/register`) plus a read-only session lookup.
//! - [`signup`]: the client-side signup wizard as a typed state machine that
//!   drives those endpoints.
//!
//! ## Verification Codes
//!
//! Codes are six digits, valid for a configurable TTL (10 minutes by default)
//! and stored as a SHA-256 hash bound to the email. Requesting a new code
//! replaces the previous one, so at most one code per email is ever valid.
//! A code is consumed by the first successful validation.
//!
//! ## Registration
//!
//! Registration only succeeds for an email whose code was validated and not
//! yet used for an account. Passwords are hashed with Argon2id.

pub mod api;
pub mod cli;
pub mod signup;
pub mod validation;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
