//! Storage seam for accounts, verification codes, and sessions.
//!
//! [`Store`] dispatches to Postgres (`sqlx`) in production and to
//! [`MemoryStore`] when no DSN is configured. Both backends give the same
//! guarantees:
//!
//! - issuing a code replaces any previous code for the email;
//! - a code is consumed by exactly one successful validation;
//! - registration removes the consumed code and inserts the account atomically.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::memory::MemoryStore;
use super::postgres;
use super::state::AuthConfig;
use super::types::SessionUser;

/// Outcome of asking for a new verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IssueOutcome {
    Issued,
    AlreadyRegistered,
    Cooldown,
}

/// Outcome of finalizing an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterOutcome {
    Created(Uuid),
    NotVerified,
    Conflict,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    SubAdmin,
    #[default]
    Teacher,
    Manager,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SubAdmin => "subAdmin",
            Self::Teacher => "teacher",
            Self::Manager => "manager",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Store {
    Postgres(PgPool),
    Memory(Arc<MemoryStore>),
}

impl Store {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// # Errors
    /// Returns an error when the backend is unreachable.
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::ping(pool).await,
            Self::Memory(_) => Ok(()),
        }
    }

    pub(crate) async fn issue_verification(
        &self,
        email: &str,
        code_hash: &[u8],
        config: &AuthConfig,
    ) -> Result<IssueOutcome> {
        match self {
            Self::Postgres(pool) => postgres::issue_verification(pool, email, code_hash, config).await,
            Self::Memory(store) => Ok(store.issue_verification(email, code_hash, config).await),
        }
    }

    /// Returns `true` when the code matched an unexpired, unused token and was consumed.
    pub(crate) async fn consume_verification(&self, email: &str, code_hash: &[u8]) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::consume_verification(pool, email, code_hash).await,
            Self::Memory(store) => Ok(store.consume_verification(email, code_hash).await),
        }
    }

    pub(crate) async fn register_user(
        &self,
        email: &str,
        password_hash: &str,
        config: &AuthConfig,
    ) -> Result<RegisterOutcome> {
        match self {
            Self::Postgres(pool) => {
                postgres::register_user(pool, email, password_hash, Role::Teacher, config).await
            }
            Self::Memory(store) => Ok(store
                .register_user(email, password_hash, Role::Teacher, config)
                .await),
        }
    }

    pub(crate) async fn lookup_session(&self, session_hash: &[u8]) -> Result<Option<SessionUser>> {
        match self {
            Self::Postgres(pool) => postgres::lookup_session(pool, session_hash).await,
            Self::Memory(store) => Ok(store.lookup_session(session_hash).await),
        }
    }
}
