use thiserror::Error;

use super::state::Step;

/// Failures surfaced by the signup wizard.
///
/// `Display` is the text shown to the user; request failures carry the
/// server message verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignupError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Request { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("The request timed out. Please try again.")]
    Timeout,

    #[error("A request is already in progress")]
    Busy,

    #[error("Not available while in step {0:?}")]
    InvalidStep(Step),

    #[error("Signup controller is no longer running")]
    Closed,
}

impl From<reqwest::Error> for SignupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}
