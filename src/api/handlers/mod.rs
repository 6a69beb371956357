//! API handlers for the signup service.
//!
//! Handlers take their dependencies as axum `Extension`s: the [`auth::Store`]
//! backing accounts and verification codes, and the shared [`auth::AuthState`].

pub mod auth;
pub mod health;
pub mod root;
