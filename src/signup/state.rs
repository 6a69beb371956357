//! Signup session data and the pure reducer that moves it between steps.

use std::fmt;

use crate::validation::{PasswordMatch, password_match, valid_email, valid_password};

/// Where the user lands after a successful registration.
pub const SIGN_IN_PATH: &str = "/users/sign-in";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Step {
    #[default]
    EmailInput,
    CodeVerification,
    PasswordSetup,
    Submitted,
}

/// The network call currently in flight. There is at most one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PendingRequest {
    SendVerification,
    ValidateCode,
    Register,
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SignupSession {
    pub email: String,
    pub token: String,
    pub password: String,
    pub confirmation: String,
    pub step: Step,
    pub pending: Option<PendingRequest>,
    /// Last success message from the server.
    pub message: Option<String>,
    /// Last error, local or remote. Cleared by the next success.
    pub error: Option<String>,
    pub redirect_to: Option<String>,
}

impl fmt::Debug for SignupSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupSession")
            .field("email", &self.email)
            .field("token", &self.token)
            .field("password", &"[redacted]")
            .field("confirmation", &"[redacted]")
            .field("step", &self.step)
            .field("pending", &self.pending)
            .field("message", &self.message)
            .field("error", &self.error)
            .field("redirect_to", &self.redirect_to)
            .finish()
    }
}

impl SignupSession {
    #[must_use]
    pub fn password_valid(&self) -> bool {
        valid_password(&self.password)
    }

    #[must_use]
    pub fn password_match(&self) -> PasswordMatch {
        password_match(&self.password, &self.confirmation)
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Send (or resend) a code for the current email.
    #[must_use]
    pub fn can_request_verification(&self) -> bool {
        !self.is_busy()
            && matches!(self.step, Step::EmailInput | Step::CodeVerification)
            && valid_email(&self.email)
    }

    #[must_use]
    pub fn can_validate_code(&self) -> bool {
        !self.is_busy() && self.step == Step::CodeVerification && !self.token.trim().is_empty()
    }

    #[must_use]
    pub fn can_register(&self) -> bool {
        !self.is_busy()
            && self.step == Step::PasswordSetup
            && self.password_valid()
            && self.password_match() == PasswordMatch::Match
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignupEvent {
    EmailEdited(String),
    TokenEdited(String),
    PasswordEdited {
        password: String,
        confirmation: String,
    },
    /// Input failed a local check; no request was made.
    Rejected(String),
    Started(PendingRequest),
    Succeeded {
        request: PendingRequest,
        message: String,
    },
    Failed {
        request: PendingRequest,
        error: String,
    },
}

/// Apply one event. Events that do not fit the current step are ignored.
#[must_use]
pub fn reduce(mut session: SignupSession, event: SignupEvent) -> SignupSession {
    match event {
        SignupEvent::EmailEdited(email) => {
            if session.is_busy() || session.step == Step::Submitted || session.email == email {
                return session;
            }
            session.email = email;
            session.error = None;
            // A code was issued for the previous address; it no longer applies.
            if session.step != Step::EmailInput {
                session.step = Step::EmailInput;
                session.token.clear();
                session.message = None;
            }
        }
        SignupEvent::TokenEdited(token) => {
            if !session.is_busy() && session.step == Step::CodeVerification {
                session.token = token;
            }
        }
        SignupEvent::PasswordEdited {
            password,
            confirmation,
        } => {
            if session.step != Step::Submitted
                && session.pending != Some(PendingRequest::Register)
            {
                session.password = password;
                session.confirmation = confirmation;
            }
        }
        SignupEvent::Rejected(error) => {
            session.message = None;
            session.error = Some(error);
        }
        SignupEvent::Started(request) => {
            if !session.is_busy() {
                session.pending = Some(request);
                session.error = None;
            }
        }
        SignupEvent::Succeeded { request, message } => {
            if session.pending != Some(request) {
                return session;
            }
            session.pending = None;
            session.error = None;
            session.message = Some(message);
            match request {
                PendingRequest::SendVerification => {
                    session.step = Step::CodeVerification;
                    session.token.clear();
                }
                PendingRequest::ValidateCode => session.step = Step::PasswordSetup,
                PendingRequest::Register => {
                    session.step = Step::Submitted;
                    session.redirect_to = Some(SIGN_IN_PATH.to_string());
                }
            }
        }
        SignupEvent::Failed { request, error } => {
            if session.pending != Some(request) {
                return session;
            }
            // The step is kept: a failed first send is still at EmailInput, and
            // a failed resend leaves the previously delivered code usable.
            session.pending = None;
            session.message = None;
            session.error = Some(error);
        }
    }
    session
}
