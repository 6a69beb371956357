//! Verification-code delivery worker and email abstractions.
//!
//! Handlers never talk to a mail provider directly. A handler reserves a slot
//! on a bounded channel, stores the code, then sends an [`EmailMessage`]
//! through the slot and returns.
//! A background task receives messages and hands each to an [`EmailSender`],
//! retrying failures with exponential backoff and jitter until
//! `max_attempts` is reached, after which the message is dropped and logged.
//!
//! The default sender is [`LogEmailSender`], which logs the payload (including
//! the code) and returns `Ok(())`. Real delivery (SMTP, provider API) plugs in
//! by implementing `EmailSender`.
use anyhow::{Result, anyhow};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub const VERIFICATION_CODE_TEMPLATE: &str = "verification_code";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    ///
    /// # Errors
    /// Returns an error when delivery failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    queue_capacity: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 100 queued messages, 5 max attempts, and
    /// 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue_capacity: 100,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let queue_capacity = self.queue_capacity.max(1);
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            queue_capacity,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of the delivery queue, shared by the handlers.
#[derive(Clone, Debug)]
pub struct EmailOutbox {
    tx: mpsc::Sender<EmailMessage>,
}

impl EmailOutbox {
    /// Claim queue capacity ahead of producing the message. Dropping the slot
    /// gives the capacity back.
    ///
    /// # Errors
    /// Returns an error when the queue is full or the worker has stopped.
    pub fn reserve(&self) -> Result<OutboxSlot<'_>> {
        self.tx
            .try_reserve()
            .map(|permit| OutboxSlot { permit })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(()) => anyhow!("email outbox is full"),
                mpsc::error::TrySendError::Closed(()) => anyhow!("email outbox worker stopped"),
            })
    }
}

/// Reserved capacity on the outbox; sending through it cannot fail.
pub struct OutboxSlot<'a> {
    permit: mpsc::Permit<'a, EmailMessage>,
}

impl OutboxSlot<'_> {
    pub fn send(self, message: EmailMessage) {
        self.permit.send(message);
    }
}

/// Spawn a background task that drains the outbox and delivers each message.
pub fn spawn_outbox_worker(
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> (EmailOutbox, tokio::task::JoinHandle<()>) {
    let config = config.normalize();
    let (tx, mut rx) = mpsc::channel::<EmailMessage>(config.queue_capacity());

    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            deliver(sender.as_ref(), &message, &config).await;
        }
        info!("email outbox closed");
    });

    (EmailOutbox { tx }, handle)
}

async fn deliver(sender: &dyn EmailSender, message: &EmailMessage, config: &EmailWorkerConfig) {
    for attempt in 1..=config.max_attempts() {
        match sender.send(message) {
            Ok(()) => return,
            Err(err) if attempt < config.max_attempts() => {
                let delay = backoff_delay(attempt, config.backoff_base(), config.backoff_max());
                warn!(
                    to_email = %message.to_email,
                    attempt,
                    "email delivery failed, retrying in {}ms: {err}",
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            Err(err) => {
                error!(
                    to_email = %message.to_email,
                    attempt,
                    "email delivery failed, giving up: {err}"
                );
            }
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
