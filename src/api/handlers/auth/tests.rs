//! Auth module tests.
//!
//! Handler tests run against the in-memory store. The Postgres tests run only
//! when `TUTORHUB_TEST_DSN` points at a scratch database.

use super::memory::MemoryStore;
use super::rate_limit::{NoopRateLimiter, RateLimiter, WindowRateLimiter};
use super::register::register;
use super::session::session;
use super::state::{AuthConfig, AuthState};
use super::storage::{IssueOutcome, RegisterOutcome, Store};
use super::types::{RegisterRequest, ValidateCodeRequest, VerifyEmailRequest};
use super::utils::{hash_session_token, hash_verification_code};
use super::verification::{validate_code, verify_email};
use crate::api::email::{EmailMessage, EmailSender, EmailWorkerConfig, spawn_outbox_worker};
use anyhow::{Context, Result, anyhow};
use axum::{
    Json,
    body::to_bytes,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<EmailMessage>>,
}

impl EmailSender for RecordingSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording sender poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

impl RecordingSender {
    /// Most recent code delivered to `email`, waiting briefly for the worker.
    async fn code_for(&self, email: &str) -> Result<String> {
        for _ in 0..200 {
            let code = {
                let sent = self.sent.lock().map_err(|_| anyhow!("poisoned"))?;
                sent.iter()
                    .rev()
                    .find(|message| message.to_email == email)
                    .map(|message| message.payload_json.clone())
            };
            if let Some(payload) = code {
                let payload: serde_json::Value = serde_json::from_str(&payload)?;
                return payload["code"]
                    .as_str()
                    .map(str::to_string)
                    .context("payload without code");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(anyhow!("no verification email for {email}"))
    }

    fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    async fn wait_for(&self, count: usize) -> Result<()> {
        for _ in 0..200 {
            if self.count() >= count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(anyhow!("expected {count} emails, got {}", self.count()))
    }
}

struct Harness {
    store: Store,
    memory: Arc<MemoryStore>,
    auth_state: Arc<AuthState>,
    sender: Arc<RecordingSender>,
}

impl Harness {
    fn new(config: AuthConfig, limiter: Arc<dyn RateLimiter>) -> Self {
        let sender = Arc::new(RecordingSender::default());
        let (outbox, _worker) = spawn_outbox_worker(sender.clone(), EmailWorkerConfig::new());
        let memory = Arc::new(MemoryStore::new());
        Self {
            store: Store::Memory(memory.clone()),
            memory,
            auth_state: Arc::new(AuthState::new(config, limiter, outbox)),
            sender,
        }
    }

    /// Harness whose outbox worker has already exited.
    async fn with_stopped_outbox(config: AuthConfig) -> Self {
        let sender = Arc::new(RecordingSender::default());
        let (outbox, worker) = spawn_outbox_worker(sender.clone(), EmailWorkerConfig::new());
        worker.abort();
        let _ = worker.await;
        let memory = Arc::new(MemoryStore::new());
        Self {
            store: Store::Memory(memory.clone()),
            memory,
            auth_state: Arc::new(AuthState::new(config, Arc::new(NoopRateLimiter), outbox)),
            sender,
        }
    }

    fn default_config() -> AuthConfig {
        AuthConfig::new("http://localhost:3000".to_string()).with_resend_cooldown_seconds(0)
    }

    async fn verify_email(&self, email: &str) -> Response {
        verify_email(
            HeaderMap::new(),
            Extension(self.store.clone()),
            Extension(self.auth_state.clone()),
            Some(Json(VerifyEmailRequest {
                email: email.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn validate_code(&self, email: &str, token: &str) -> Response {
        validate_code(
            HeaderMap::new(),
            Extension(self.store.clone()),
            Extension(self.auth_state.clone()),
            Some(Json(ValidateCodeRequest {
                email: email.to_string(),
                token: token.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn register(&self, email: &str, password: &str) -> Response {
        register(
            HeaderMap::new(),
            Extension(self.store.clone()),
            Extension(self.auth_state.clone()),
            Some(Json(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
            })),
        )
        .await
        .into_response()
    }
}

async fn message_of(response: Response) -> Result<String> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    json["message"]
        .as_str()
        .map(str::to_string)
        .context("response without message")
}

fn wrong_code(code: &str) -> String {
    if code == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

#[tokio::test]
async fn verify_email_missing_payload_and_bad_email() -> Result<()> {
    let harness = Harness::new(Harness::default_config(), Arc::new(NoopRateLimiter));

    let response = verify_email(
        HeaderMap::new(),
        Extension(harness.store.clone()),
        Extension(harness.auth_state.clone()),
        None,
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness.verify_email("not-an-email").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(message_of(response).await?, "Invalid email address");
    assert_eq!(harness.sender.count(), 0);
    Ok(())
}

#[tokio::test]
async fn full_signup_sequence() -> Result<()> {
    let harness = Harness::new(Harness::default_config(), Arc::new(NoopRateLimiter));

    let response = harness.verify_email(" A@B.com ").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(message_of(response).await?, "Verification code sent to email.");

    let code = harness.sender.code_for("a@b.com").await?;
    assert_eq!(code.len(), 6);

    let response = harness.validate_code("a@b.com", &wrong_code(&code)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(message_of(response).await?, "Invalid or expired token.");

    let response = harness.validate_code("a@b.com", &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(message_of(response).await?, "Email verified successfully!");

    // Consumed: the same code cannot validate twice.
    let response = harness.validate_code("a@b.com", &code).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness.register("a@b.com", "abcdef").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(message_of(response).await?, "Registration successful!");

    let user = harness
        .memory
        .user("a@b.com")
        .await
        .context("account missing")?;
    assert!(user.password_hash.starts_with("$argon2id$"));
    assert_eq!(user.role, super::Role::Teacher);

    let response = harness.register("a@b.com", "abcdef").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = harness.verify_email("a@b.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn new_code_replaces_previous() -> Result<()> {
    let harness = Harness::new(Harness::default_config(), Arc::new(NoopRateLimiter));

    assert_eq!(harness.verify_email("a@b.com").await.status(), StatusCode::OK);
    let first = harness.sender.code_for("a@b.com").await?;
    assert_eq!(harness.verify_email("a@b.com").await.status(), StatusCode::OK);
    harness.sender.wait_for(2).await?;
    let second = harness.sender.code_for("a@b.com").await?;
    if first == second {
        // Both draws produced the same six digits; nothing to tell apart.
        return Ok(());
    }

    let response = harness.validate_code("a@b.com", &first).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = harness.validate_code("a@b.com", &second).await;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn resend_cooldown_returns_too_many_requests() -> Result<()> {
    let config = AuthConfig::new("http://localhost:3000".to_string());
    let harness = Harness::new(config, Arc::new(NoopRateLimiter));

    assert_eq!(harness.verify_email("a@b.com").await.status(), StatusCode::OK);
    let code = harness.sender.code_for("a@b.com").await?;

    let response = harness.verify_email("a@b.com").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        message_of(response).await?,
        "Please wait before requesting another code"
    );

    // The rejected resend leaves the delivered code usable.
    let response = harness.validate_code("a@b.com", &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn queue_failure_stores_no_code() -> Result<()> {
    let config = AuthConfig::new("http://localhost:3000".to_string());
    let harness = Harness::with_stopped_outbox(config.clone()).await;

    let response = harness.verify_email("a@b.com").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(message_of(response).await?, "Failed to send verification code");

    // No cooldown was started by the failed attempt.
    let response = harness.verify_email("a@b.com").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let code_hash = hash_verification_code("a@b.com", "123456");
    let outcome = harness
        .store
        .issue_verification("a@b.com", &code_hash, &config)
        .await?;
    assert_eq!(outcome, IssueOutcome::Issued);
    assert_eq!(harness.sender.count(), 0);
    Ok(())
}

#[tokio::test]
async fn rate_limiter_blocks_before_issuing() -> Result<()> {
    let limiter = Arc::new(WindowRateLimiter::new(Duration::from_secs(60), 100, 1));
    let harness = Harness::new(Harness::default_config(), limiter);

    assert_eq!(harness.verify_email("a@b.com").await.status(), StatusCode::OK);
    let response = harness.verify_email("a@b.com").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        message_of(response).await?,
        "Too many requests. Please try again later."
    );
    Ok(())
}

#[tokio::test]
async fn validate_code_rejects_missing_and_malformed() -> Result<()> {
    let harness = Harness::new(Harness::default_config(), Arc::new(NoopRateLimiter));

    let response = harness.validate_code("a@b.com", "  ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(message_of(response).await?, "Missing verification code");

    let response = harness.validate_code("a@b.com", "12ab56").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No code was ever issued.
    let response = harness.validate_code("a@b.com", "123456").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn register_requires_verification_and_valid_password() -> Result<()> {
    let harness = Harness::new(Harness::default_config(), Arc::new(NoopRateLimiter));

    let response = harness.register("a@b.com", "abcdef").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(message_of(response).await?, "Email is not verified");

    let response = harness.register("a@b.com", "123456").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness.register("bad", "abcdef").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn concurrent_validation_succeeds_once() -> Result<()> {
    let harness = Arc::new(Harness::new(
        Harness::default_config(),
        Arc::new(NoopRateLimiter),
    ));
    assert_eq!(harness.verify_email("a@b.com").await.status(), StatusCode::OK);
    let code = harness.sender.code_for("a@b.com").await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let harness = harness.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            harness.validate_code("a@b.com", &code).await.status()
        }));
    }
    let mut ok = 0;
    for handle in handles {
        if handle.await? == StatusCode::OK {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    Ok(())
}

#[tokio::test]
async fn session_reports_user_or_null() -> Result<()> {
    let harness = Harness::new(Harness::default_config(), Arc::new(NoopRateLimiter));

    let response = session(HeaderMap::new(), Extension(harness.store.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&body)?,
        serde_json::json!({ "user": null })
    );

    harness.verify_email("a@b.com").await;
    let code = harness.sender.code_for("a@b.com").await?;
    harness.validate_code("a@b.com", &code).await;
    assert_eq!(
        harness.register("a@b.com", "abcdef").await.status(),
        StatusCode::OK
    );
    assert!(
        harness
            .memory
            .insert_session("raw-token", "a@b.com", Duration::from_secs(60))
            .await
    );

    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_static("tutorhub_session=raw-token"));
    let response = session(headers, Extension(harness.store.clone()))
        .await
        .into_response();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&body)?,
        serde_json::json!({ "user": { "name": null, "email": "a@b.com" } })
    );
    Ok(())
}

// Postgres-backed checks.

async fn test_pool() -> Option<PgPool> {
    let Ok(dsn) = std::env::var("TUTORHUB_TEST_DSN") else {
        eprintln!("Skipping Postgres test: TUTORHUB_TEST_DSN not set");
        return None;
    };
    let pool = match PgPoolOptions::new().max_connections(5).connect(&dsn).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Skipping Postgres test: {err}");
            return None;
        }
    };
    match apply_schema(&pool).await {
        Ok(()) => Some(pool),
        Err(err) => {
            eprintln!("Skipping Postgres test: {err:#}");
            None
        }
    }
}

async fn apply_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_SQL
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
    {
        if let Err(err) = sqlx::query(statement).execute(pool).await {
            // duplicate_object: the enum type survives from a previous run.
            let duplicate = matches!(
                &err,
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42710")
            );
            if !duplicate {
                return Err(err).with_context(|| format!("failed to apply: {statement}"));
            }
        }
    }
    Ok(())
}

fn unique_email() -> String {
    format!("{}@example.com", ulid::Ulid::new().to_string().to_lowercase())
}

#[tokio::test]
async fn postgres_issue_consume_register() -> Result<()> {
    let Some(pool) = test_pool().await else {
        return Ok(());
    };
    let store = Store::Postgres(pool);
    let config = AuthConfig::new("http://localhost:3000".to_string());
    let email = unique_email();
    let hash = hash_verification_code(&email, "123456");

    assert_eq!(
        store.issue_verification(&email, &hash, &config).await?,
        IssueOutcome::Issued
    );
    assert_eq!(
        store.issue_verification(&email, &hash, &config).await?,
        IssueOutcome::Cooldown
    );

    assert_eq!(
        store.register_user(&email, "hash", &config).await?,
        RegisterOutcome::NotVerified
    );
    assert!(!store.consume_verification(&email, &hash_verification_code(&email, "000000")).await?);
    assert!(store.consume_verification(&email, &hash).await?);
    assert!(!store.consume_verification(&email, &hash).await?);

    assert!(matches!(
        store.register_user(&email, "hash", &config).await?,
        RegisterOutcome::Created(_)
    ));
    assert_eq!(
        store.register_user(&email, "hash", &config).await?,
        RegisterOutcome::Conflict
    );
    assert_eq!(
        store.issue_verification(&email, &hash, &config).await?,
        IssueOutcome::AlreadyRegistered
    );
    assert!(store.lookup_session(&hash_session_token("missing")).await?.is_none());
    store.ping().await?;
    Ok(())
}

#[tokio::test]
async fn postgres_concurrent_consume_yields_one_success() -> Result<()> {
    let Some(pool) = test_pool().await else {
        return Ok(());
    };
    let store = Store::Postgres(pool);
    let config = AuthConfig::new("http://localhost:3000".to_string());
    let email = unique_email();
    let hash = hash_verification_code(&email, "654321");
    store.issue_verification(&email, &hash, &config).await?;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        let email = email.clone();
        let hash = hash.clone();
        handles.push(tokio::spawn(async move {
            store.consume_verification(&email, &hash).await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await?? {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    Ok(())
}

async fn register_concurrently(store: &Store, config: &AuthConfig) -> Result<Vec<RegisterOutcome>> {
    let email = unique_email();
    let hash = hash_verification_code(&email, "111111");
    store.issue_verification(&email, &hash, config).await?;
    assert!(store.consume_verification(&email, &hash).await?);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let config = config.clone();
        let email = email.clone();
        handles.push(tokio::spawn(async move {
            store.register_user(&email, "hash", &config).await
        }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await??);
    }
    Ok(outcomes)
}

fn assert_one_created_rest_conflict(outcomes: &[RegisterOutcome]) {
    let created = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, RegisterOutcome::Created(_)))
        .count();
    assert_eq!(created, 1, "{outcomes:?}");
    assert!(
        outcomes
            .iter()
            .all(|outcome| matches!(outcome, RegisterOutcome::Created(_) | RegisterOutcome::Conflict)),
        "{outcomes:?}"
    );
}

#[tokio::test]
async fn concurrent_registrations_conflict() -> Result<()> {
    let store = Store::Memory(Arc::new(MemoryStore::new()));
    let config = AuthConfig::new("http://localhost:3000".to_string());
    let outcomes = register_concurrently(&store, &config).await?;
    assert_one_created_rest_conflict(&outcomes);
    Ok(())
}

#[tokio::test]
async fn postgres_concurrent_registrations_conflict() -> Result<()> {
    let Some(pool) = test_pool().await else {
        return Ok(());
    };
    let store = Store::Postgres(pool);
    let config = AuthConfig::new("http://localhost:3000".to_string());
    let outcomes = register_concurrently(&store, &config).await?;
    assert_one_created_rest_conflict(&outcomes);
    Ok(())
}
