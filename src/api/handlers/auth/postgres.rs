//! Postgres queries behind [`super::storage::Store::Postgres`].

use anyhow::{Context, Result};
use sqlx::{Connection, PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::state::AuthConfig;
use super::storage::{IssueOutcome, RegisterOutcome, Role};
use super::types::SessionUser;
use super::utils::is_unique_violation;

pub(super) async fn ping(pool: &PgPool) -> Result<()> {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = pool
        .acquire()
        .instrument(acquire_span)
        .await
        .context("failed to acquire database connection")?;

    let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    conn.ping()
        .instrument(ping_span)
        .await
        .context("failed to ping database")
}

async fn user_exists<'e, E>(executor: E, email: &str) -> Result<bool>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = "SELECT 1 FROM users WHERE email = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.is_some())
}

pub(super) async fn issue_verification(
    pool: &PgPool,
    email: &str,
    code_hash: &[u8],
    config: &AuthConfig,
) -> Result<IssueOutcome> {
    if user_exists(pool, email).await? {
        return Ok(IssueOutcome::AlreadyRegistered);
    }

    // One row per email; the conditional update enforces the resend cooldown.
    let query = r"
        INSERT INTO email_verification_tokens
            (email, token_hash, expires_at, created_at, consumed_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'), NOW(), NULL)
        ON CONFLICT (email) DO UPDATE
        SET token_hash = EXCLUDED.token_hash,
            expires_at = EXCLUDED.expires_at,
            created_at = EXCLUDED.created_at,
            consumed_at = NULL
        WHERE email_verification_tokens.created_at <= NOW() - ($4 * INTERVAL '1 second')
        RETURNING email
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(code_hash)
        .bind(config.email_token_ttl_seconds())
        .bind(config.resend_cooldown_seconds())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to store verification code")?;

    Ok(if row.is_some() {
        IssueOutcome::Issued
    } else {
        IssueOutcome::Cooldown
    })
}

pub(super) async fn consume_verification(
    pool: &PgPool,
    email: &str,
    code_hash: &[u8],
) -> Result<bool> {
    // Single statement: concurrent validations of one code see exactly one success.
    let query = r"
        UPDATE email_verification_tokens
        SET consumed_at = NOW()
        WHERE email = $1
          AND token_hash = $2
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING email
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(code_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume verification code")?;
    Ok(row.is_some())
}

pub(super) async fn register_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    role: Role,
    config: &AuthConfig,
) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("begin register transaction")?;

    if user_exists(&mut *tx, email).await? {
        let _ = tx.rollback().await;
        return Ok(RegisterOutcome::Conflict);
    }

    // The verified window starts when the code was consumed.
    let query = r"
        DELETE FROM email_verification_tokens
        WHERE email = $1
          AND consumed_at IS NOT NULL
          AND consumed_at > NOW() - ($2 * INTERVAL '1 second')
        RETURNING consumed_at
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let verified = sqlx::query(query)
        .bind(email)
        .bind(config.email_token_ttl_seconds())
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume verified email record")?;

    if verified.is_none() {
        // A concurrent registration may have consumed the record while this
        // DELETE waited on its row lock.
        let registered = user_exists(&mut *tx, email).await?;
        let _ = tx.rollback().await;
        return Ok(if registered {
            RegisterOutcome::Conflict
        } else {
            RegisterOutcome::NotVerified
        });
    }

    let query = r"
        INSERT INTO users
            (id, email, password_hash, role, email_verified_at)
        VALUES ($1, $2, $3, $4::user_role, NOW())
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(Uuid::now_v7())
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    tx.commit().await.context("commit register transaction")?;

    Ok(RegisterOutcome::Created(user_id))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    session_hash: &[u8],
) -> Result<Option<SessionUser>> {
    let query = r"
        SELECT u.name, u.email
        FROM user_sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.session_hash = $1
          AND s.expires_at > NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| SessionUser {
        name: row.get("name"),
        email: row.get("email"),
    }))
}
