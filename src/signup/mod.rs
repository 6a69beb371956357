//! Client side of the signup wizard.
//!
//! The session moves `EmailInput → CodeVerification → PasswordSetup →
//! Submitted`. State changes go through [`reduce`]; [`SignupController`] runs
//! the network calls against a [`SignupApi`] (normally [`HttpSignupApi`]) with
//! a per-request timeout, and [`spawn`] turns it into a task driven over
//! channels.

mod client;
mod controller;
mod error;
mod state;

pub use client::{HttpSignupApi, REGISTER_PATH, SignupApi, VALIDATE_CODE_PATH, VERIFY_EMAIL_PATH};
pub use controller::{
    DEFAULT_REQUEST_TIMEOUT, SignupCommand, SignupController, SignupHandle, spawn,
};
pub use error::SignupError;
pub use state::{PendingRequest, SIGN_IN_PATH, SignupEvent, SignupSession, Step, reduce};
pub use crate::validation::PasswordMatch;
