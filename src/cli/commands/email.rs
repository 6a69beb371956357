use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_EMAIL_QUEUE_CAPACITY: &str = "email-queue-capacity";
pub const ARG_EMAIL_MAX_ATTEMPTS: &str = "email-max-attempts";
pub const ARG_EMAIL_BACKOFF_BASE_SECONDS: &str = "email-backoff-base-seconds";
pub const ARG_EMAIL_BACKOFF_MAX_SECONDS: &str = "email-backoff-max-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_QUEUE_CAPACITY)
                .long(ARG_EMAIL_QUEUE_CAPACITY)
                .help("Verification emails buffered before requests are refused")
                .env("TUTORHUB_EMAIL_QUEUE_CAPACITY")
                .default_value("100")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_EMAIL_MAX_ATTEMPTS)
                .long(ARG_EMAIL_MAX_ATTEMPTS)
                .help("Delivery attempts before an email is dropped")
                .env("TUTORHUB_EMAIL_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_EMAIL_BACKOFF_BASE_SECONDS)
                .long(ARG_EMAIL_BACKOFF_BASE_SECONDS)
                .help("Base delay for delivery retry backoff")
                .env("TUTORHUB_EMAIL_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_EMAIL_BACKOFF_MAX_SECONDS)
                .long(ARG_EMAIL_BACKOFF_MAX_SECONDS)
                .help("Max delay for delivery retry backoff")
                .env("TUTORHUB_EMAIL_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            queue_capacity: matches
                .get_one::<usize>(ARG_EMAIL_QUEUE_CAPACITY)
                .copied()
                .context("missing required argument: --email-queue-capacity")?,
            max_attempts: matches
                .get_one::<u32>(ARG_EMAIL_MAX_ATTEMPTS)
                .copied()
                .context("missing required argument: --email-max-attempts")?,
            backoff_base_seconds: matches
                .get_one::<u64>(ARG_EMAIL_BACKOFF_BASE_SECONDS)
                .copied()
                .context("missing required argument: --email-backoff-base-seconds")?,
            backoff_max_seconds: matches
                .get_one::<u64>(ARG_EMAIL_BACKOFF_MAX_SECONDS)
                .copied()
                .context("missing required argument: --email-backoff-max-seconds")?,
        })
    }
}
