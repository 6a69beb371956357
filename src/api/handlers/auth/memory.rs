//! In-process store used when no database is configured.
//!
//! All state sits behind one `tokio::sync::Mutex`, so each operation is a
//! single critical section and concurrent validations of one code see exactly
//! one success. Timestamps use `tokio::time::Instant` so tests can pause and
//! advance the clock.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::state::AuthConfig;
use super::storage::{IssueOutcome, RegisterOutcome, Role};
use super::types::SessionUser;
use super::utils::hash_session_token;

#[derive(Debug)]
struct TokenRecord {
    token_hash: Vec<u8>,
    expires_at: Instant,
    created_at: Instant,
    consumed_at: Option<Instant>,
}

/// Account as held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub email_verified_at: Instant,
}

#[derive(Debug)]
struct SessionRecord {
    email: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    tokens: HashMap<String, TokenRecord>,
    users: HashMap<String, UserAccount>,
    sessions: HashMap<Vec<u8>, SessionRecord>,
}

impl Inner {
    /// Drop codes that can no longer validate or back a registration, and
    /// expired sessions.
    fn prune(&mut self, now: Instant, window: Duration) {
        self.tokens.retain(|_, token| match token.consumed_at {
            Some(consumed_at) => now < consumed_at + window,
            None => token.expires_at > now,
        });
        self.sessions.retain(|_, session| session.expires_at > now);
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn seconds(value: i64) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(0))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an account by normalized email.
    pub async fn user(&self, email: &str) -> Option<UserAccount> {
        self.inner.lock().await.users.get(email).cloned()
    }

    /// Attach a session token to an existing account.
    ///
    /// Returns `false` when no account exists for `email`. Session issuance
    /// belongs to the login flow; this exists for local setups and tests.
    pub async fn insert_session(&self, token: &str, email: &str, ttl: Duration) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(email) {
            return false;
        }
        let now = Instant::now();
        inner.sessions.retain(|_, session| session.expires_at > now);
        inner.sessions.insert(
            hash_session_token(token),
            SessionRecord {
                email: email.to_string(),
                expires_at: now + ttl,
            },
        );
        true
    }

    /// Set the display name returned by the session endpoint.
    pub async fn set_name(&self, email: &str, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.users.get_mut(email) {
            Some(user) => {
                user.name = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    pub(super) async fn issue_verification(
        &self,
        email: &str,
        code_hash: &[u8],
        config: &AuthConfig,
    ) -> IssueOutcome {
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(email) {
            return IssueOutcome::AlreadyRegistered;
        }

        let now = Instant::now();
        inner.prune(now, seconds(config.email_token_ttl_seconds()));
        if let Some(existing) = inner.tokens.get(email) {
            if now < existing.created_at + seconds(config.resend_cooldown_seconds()) {
                return IssueOutcome::Cooldown;
            }
        }

        inner.tokens.insert(
            email.to_string(),
            TokenRecord {
                token_hash: code_hash.to_vec(),
                expires_at: now + seconds(config.email_token_ttl_seconds()),
                created_at: now,
                consumed_at: None,
            },
        );
        IssueOutcome::Issued
    }

    pub(super) async fn consume_verification(&self, email: &str, code_hash: &[u8]) -> bool {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        match inner.tokens.get_mut(email) {
            Some(token)
                if token.consumed_at.is_none()
                    && token.expires_at > now
                    && token.token_hash == code_hash =>
            {
                token.consumed_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub(super) async fn register_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
        config: &AuthConfig,
    ) -> RegisterOutcome {
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(email) {
            return RegisterOutcome::Conflict;
        }

        let now = Instant::now();
        let window = seconds(config.email_token_ttl_seconds());
        let verified = inner
            .tokens
            .get(email)
            .and_then(|token| token.consumed_at)
            .is_some_and(|consumed_at| now < consumed_at + window);
        if !verified {
            return RegisterOutcome::NotVerified;
        }

        inner.tokens.remove(email);
        let id = Uuid::now_v7();
        inner.users.insert(
            email.to_string(),
            UserAccount {
                id,
                email: email.to_string(),
                name: None,
                password_hash: password_hash.to_string(),
                role,
                email_verified_at: now,
            },
        );
        RegisterOutcome::Created(id)
    }

    pub(super) async fn lookup_session(&self, session_hash: &[u8]) -> Option<SessionUser> {
        let inner = self.inner.lock().await;
        let session = inner.sessions.get(session_hash)?;
        if session.expires_at <= Instant::now() {
            return None;
        }
        inner.users.get(&session.email).map(|user| SessionUser {
            name: user.name.clone(),
            email: user.email.clone(),
        })
    }
}
