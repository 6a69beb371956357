use crate::api::{self, AuthConfig, MemoryStore, Store, email::EmailWorkerConfig};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_base_url: String,
    pub email_token_ttl_seconds: i64,
    pub email_resend_cooldown_seconds: i64,
    pub email_queue_capacity: usize,
    pub email_max_attempts: u32,
    pub email_backoff_base_seconds: u64,
    pub email_backoff_max_seconds: u64,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.frontend_base_url.clone())
            .with_email_token_ttl_seconds(self.email_token_ttl_seconds)
            .with_resend_cooldown_seconds(self.email_resend_cooldown_seconds)
    }

    fn email_config(&self) -> EmailWorkerConfig {
        EmailWorkerConfig::new()
            .with_queue_capacity(self.email_queue_capacity)
            .with_max_attempts(self.email_max_attempts)
            .with_backoff_base_seconds(self.email_backoff_base_seconds)
            .with_backoff_max_seconds(self.email_backoff_max_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store = match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;
            info!("Using Postgres storage");
            Store::Postgres(pool)
        }
        None => {
            warn!("No DSN configured, using in-memory storage; data is lost on restart");
            Store::Memory(Arc::new(MemoryStore::new()))
        }
    };

    let auth_config = args.auth_config();
    let email_config = args.email_config();

    api::new(args.port, store, auth_config, email_config).await
}
