//! HTTP binding of the three signup endpoints.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use tracing::debug;
use url::Url;

use super::error::SignupError;
use crate::api::handlers::auth::types::{
    MessageResponse, RegisterRequest, ValidateCodeRequest, VerifyEmailRequest,
};

pub const VERIFY_EMAIL_PATH: &str = "/api/auth/verify-email";
pub const VALIDATE_CODE_PATH: &str = "/api/auth/validate-code";
pub const REGISTER_PATH: &str = "/api/auth/register";

/// The calls the signup wizard makes. Each resolves to the server's `message`.
pub trait SignupApi: Send + Sync + 'static {
    fn verify_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<String, SignupError>> + Send;

    fn validate_code(
        &self,
        email: &str,
        token: &str,
    ) -> impl Future<Output = Result<String, SignupError>> + Send;

    fn register(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<String, SignupError>> + Send;
}

/// Fallback texts used when a response carries no usable `message`.
struct Fallback {
    success: &'static str,
    failure: &'static str,
}

const VERIFY_EMAIL_FALLBACK: Fallback = Fallback {
    success: "Verification code sent to email.",
    failure: "An error occurred.",
};

const VALIDATE_CODE_FALLBACK: Fallback = Fallback {
    success: "Email verified successfully!",
    failure: "Invalid or expired token.",
};

const REGISTER_FALLBACK: Fallback = Fallback {
    success: "Registration successful!",
    failure: "Registration failed",
};

#[derive(Clone, Debug)]
pub struct HttpSignupApi {
    client: Client,
    base_url: Url,
}

impl HttpSignupApi {
    /// Client for the service at `base_url` (scheme, host and port).
    ///
    /// # Errors
    /// Returns an error if the URL does not parse or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid service URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        fallback: &Fallback,
    ) -> Result<String, SignupError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| SignupError::Network(err.to_string()))?;

        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        debug!(%status, path, "signup request completed");

        // Anything that is not a `{message}` body counts as no message.
        let message = response
            .json::<MessageResponse>()
            .await
            .ok()
            .map(|body| body.message)
            .filter(|message| !message.is_empty());

        if status.is_success() {
            Ok(message.unwrap_or_else(|| fallback.success.to_string()))
        } else {
            Err(SignupError::Request {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| fallback.failure.to_string()),
            })
        }
    }
}

impl SignupApi for HttpSignupApi {
    async fn verify_email(&self, email: &str) -> Result<String, SignupError> {
        let body = VerifyEmailRequest {
            email: email.to_string(),
        };
        self.post(VERIFY_EMAIL_PATH, &body, &VERIFY_EMAIL_FALLBACK)
            .await
    }

    async fn validate_code(&self, email: &str, token: &str) -> Result<String, SignupError> {
        let body = ValidateCodeRequest {
            email: email.to_string(),
            token: token.to_string(),
        };
        self.post(VALIDATE_CODE_PATH, &body, &VALIDATE_CODE_FALLBACK)
            .await
    }

    async fn register(&self, email: &str, password: &str) -> Result<String, SignupError> {
        let body = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post(REGISTER_PATH, &body, &REGISTER_FALLBACK).await
    }
}
