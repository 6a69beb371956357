use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_EMAIL_TOKEN_TTL_SECONDS: &str = "email-token-ttl-seconds";
pub const ARG_EMAIL_RESEND_COOLDOWN_SECONDS: &str = "email-resend-cooldown-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the allowed CORS origin")
                .env("TUTORHUB_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .long(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .help("Verification code TTL in seconds")
                .env("TUTORHUB_EMAIL_TOKEN_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_EMAIL_RESEND_COOLDOWN_SECONDS)
                .long(ARG_EMAIL_RESEND_COOLDOWN_SECONDS)
                .help("Cooldown before another code can be sent to the same email")
                .env("TUTORHUB_EMAIL_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub email_token_ttl_seconds: i64,
    pub email_resend_cooldown_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            email_token_ttl_seconds: matches
                .get_one::<i64>(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .copied()
                .context("missing required argument: --email-token-ttl-seconds")?,
            email_resend_cooldown_seconds: matches
                .get_one::<i64>(ARG_EMAIL_RESEND_COOLDOWN_SECONDS)
                .copied()
                .context("missing required argument: --email-resend-cooldown-seconds")?,
        })
    }
}
