//! Input rules shared by the signup wizard and the API handlers.

use regex::Regex;

/// Minimum number of characters in a password.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Standard address shape: something, `@`, something, `.`, something, no whitespace.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").is_ok_and(|regex| regex.is_match(email))
}

/// At least six characters on a single line, one of them an ASCII letter.
#[must_use]
pub fn valid_password(password: &str) -> bool {
    if password.contains(|c| c == '\n' || c == '\r') {
        return false;
    }
    password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_ascii_alphabetic())
}

/// Comparison between a password and its confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordMatch {
    /// One of the fields is still empty; nothing to show yet.
    Empty,
    Match,
    Mismatch,
}

#[must_use]
pub fn password_match(password: &str, confirmation: &str) -> PasswordMatch {
    if password.is_empty() || confirmation.is_empty() {
        PasswordMatch::Empty
    } else if password.as_bytes() == confirmation.as_bytes() {
        PasswordMatch::Match
    } else {
        PasswordMatch::Mismatch
    }
}
