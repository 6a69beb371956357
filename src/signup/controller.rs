//! Drives a [`SignupSession`] through the signup endpoints.
//!
//! [`SignupController`] owns the session and runs one call at a time when used
//! directly. [`spawn`] moves it into a task that takes [`SignupCommand`]s over
//! a channel, runs requests in the background and publishes every state change
//! on a watch channel.

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::timeout,
};
use tracing::{debug, info, warn};

use super::client::SignupApi;
use super::error::SignupError;
use super::state::{PendingRequest, SIGN_IN_PATH, SignupEvent, SignupSession, Step, reduce};
use crate::validation::{PasswordMatch, valid_email};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const COMMAND_QUEUE: usize = 16;

enum Call {
    SendVerification { email: String },
    ValidateCode { email: String, token: String },
    Register { email: String, password: String },
}

impl Call {
    fn request(&self) -> PendingRequest {
        match self {
            Self::SendVerification { .. } => PendingRequest::SendVerification,
            Self::ValidateCode { .. } => PendingRequest::ValidateCode,
            Self::Register { .. } => PendingRequest::Register,
        }
    }
}

type Completion = (PendingRequest, Result<String, SignupError>);

async fn perform<A: SignupApi>(api: Arc<A>, call: Call, limit: Duration) -> Completion {
    let request = call.request();
    let result = match &call {
        Call::SendVerification { email } => timeout(limit, api.verify_email(email)).await,
        Call::ValidateCode { email, token } => {
            timeout(limit, api.validate_code(email, token)).await
        }
        Call::Register { email, password } => timeout(limit, api.register(email, password)).await,
    };
    (request, result.unwrap_or(Err(SignupError::Timeout)))
}

pub struct SignupController<A> {
    api: Arc<A>,
    session: SignupSession,
    request_timeout: Duration,
}

impl<A: SignupApi> SignupController<A> {
    pub fn new(api: A) -> Self {
        Self {
            api: Arc::new(api),
            session: SignupSession::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn session(&self) -> &SignupSession {
        &self.session
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Change the email. After a code was sent this starts over at the email
    /// step; password fields are kept.
    ///
    /// # Errors
    /// `Busy` while a request is in flight, `InvalidStep` once submitted.
    pub fn edit_email(&mut self, email: &str) -> Result<(), SignupError> {
        self.ensure_idle()?;
        self.apply(SignupEvent::EmailEdited(email.to_string()));
        Ok(())
    }

    /// Update the password fields. Local only.
    ///
    /// # Errors
    /// `Busy` while registering, `InvalidStep` once submitted.
    pub fn set_password(&mut self, password: &str, confirmation: &str) -> Result<(), SignupError> {
        if self.session.step == Step::Submitted {
            return Err(SignupError::InvalidStep(Step::Submitted));
        }
        if self.session.pending == Some(PendingRequest::Register) {
            return Err(SignupError::Busy);
        }
        self.apply(SignupEvent::PasswordEdited {
            password: password.to_string(),
            confirmation: confirmation.to_string(),
        });
        Ok(())
    }

    /// Ask the service to email a code to `email`.
    ///
    /// # Errors
    /// Local validation failures and the request outcome.
    pub async fn request_verification(&mut self, email: &str) -> Result<String, SignupError> {
        let call = self.begin_verification(email)?;
        self.run(call).await
    }

    /// Submit the code the user received.
    ///
    /// # Errors
    /// Local validation failures and the request outcome.
    pub async fn validate_code(&mut self, token: &str) -> Result<String, SignupError> {
        let call = self.begin_validation(token)?;
        self.run(call).await
    }

    /// Create the account, returning where to redirect the user.
    ///
    /// # Errors
    /// Local validation failures and the request outcome.
    pub async fn register(&mut self) -> Result<&'static str, SignupError> {
        let call = self.begin_register()?;
        self.run(call).await?;
        Ok(SIGN_IN_PATH)
    }

    /// Request a new code for the current email.
    ///
    /// # Errors
    /// `InvalidStep` outside the code step, otherwise the request outcome.
    pub async fn resend(&mut self) -> Result<String, SignupError> {
        let call = self.begin_resend()?;
        self.run(call).await
    }

    async fn run(&mut self, call: Call) -> Result<String, SignupError> {
        let (request, result) = perform(Arc::clone(&self.api), call, self.request_timeout).await;
        self.finish(request, result)
    }

    fn dispatch(&mut self, command: SignupCommand) -> Result<Option<Call>, SignupError> {
        match command {
            SignupCommand::EditEmail(email) => self.edit_email(&email).map(|()| None),
            SignupCommand::SetPassword {
                password,
                confirmation,
            } => self.set_password(&password, &confirmation).map(|()| None),
            SignupCommand::RequestVerification(email) => self.begin_verification(&email).map(Some),
            SignupCommand::ValidateCode(token) => self.begin_validation(&token).map(Some),
            SignupCommand::Register => self.begin_register().map(Some),
            SignupCommand::Resend => self.begin_resend().map(Some),
        }
    }

    fn begin_verification(&mut self, email: &str) -> Result<Call, SignupError> {
        self.ensure_idle()?;
        self.apply(SignupEvent::EmailEdited(email.to_string()));
        self.ensure_step(&[Step::EmailInput, Step::CodeVerification])?;
        if !valid_email(email) {
            return Err(self.reject("Please enter a valid email address."));
        }
        Ok(self.start(Call::SendVerification {
            email: email.to_string(),
        }))
    }

    fn begin_validation(&mut self, token: &str) -> Result<Call, SignupError> {
        self.ensure_idle()?;
        self.ensure_step(&[Step::CodeVerification])?;
        self.apply(SignupEvent::TokenEdited(token.to_string()));
        let token = token.trim();
        if token.is_empty() {
            return Err(self.reject("Please enter the verification code."));
        }
        Ok(self.start(Call::ValidateCode {
            email: self.session.email.clone(),
            token: token.to_string(),
        }))
    }

    fn begin_register(&mut self) -> Result<Call, SignupError> {
        self.ensure_idle()?;
        self.ensure_step(&[Step::PasswordSetup])?;
        if !self.session.password_valid() {
            return Err(
                self.reject("Password must be at least 6 characters and include a letter.")
            );
        }
        if self.session.password_match() != PasswordMatch::Match {
            return Err(self.reject("Passwords do not match."));
        }
        Ok(self.start(Call::Register {
            email: self.session.email.clone(),
            password: self.session.password.clone(),
        }))
    }

    fn begin_resend(&mut self) -> Result<Call, SignupError> {
        self.ensure_idle()?;
        self.ensure_step(&[Step::CodeVerification])?;
        Ok(self.start(Call::SendVerification {
            email: self.session.email.clone(),
        }))
    }

    fn finish(
        &mut self,
        request: PendingRequest,
        result: Result<String, SignupError>,
    ) -> Result<String, SignupError> {
        let event = match &result {
            Ok(message) => {
                info!(?request, "signup request succeeded");
                SignupEvent::Succeeded {
                    request,
                    message: message.clone(),
                }
            }
            Err(err) => {
                warn!(?request, "signup request failed: {err}");
                SignupEvent::Failed {
                    request,
                    error: err.to_string(),
                }
            }
        };
        self.apply(event);
        result
    }

    fn ensure_idle(&self) -> Result<(), SignupError> {
        if self.session.step == Step::Submitted {
            return Err(SignupError::InvalidStep(Step::Submitted));
        }
        if self.session.is_busy() {
            return Err(SignupError::Busy);
        }
        Ok(())
    }

    fn ensure_step(&self, allowed: &[Step]) -> Result<(), SignupError> {
        if allowed.contains(&self.session.step) {
            Ok(())
        } else {
            Err(SignupError::InvalidStep(self.session.step))
        }
    }

    fn start(&mut self, call: Call) -> Call {
        debug!(request = ?call.request(), "signup request started");
        self.apply(SignupEvent::Started(call.request()));
        call
    }

    fn reject(&mut self, message: &str) -> SignupError {
        self.apply(SignupEvent::Rejected(message.to_string()));
        SignupError::Validation(message.to_string())
    }

    fn apply(&mut self, event: SignupEvent) {
        self.session = reduce(std::mem::take(&mut self.session), event);
    }
}

/// Input accepted by a spawned controller.
pub enum SignupCommand {
    EditEmail(String),
    SetPassword {
        password: String,
        confirmation: String,
    },
    RequestVerification(String),
    ValidateCode(String),
    Register,
    Resend,
}

type Envelope = (SignupCommand, oneshot::Sender<Result<(), SignupError>>);

#[derive(Clone)]
pub struct SignupHandle {
    commands: mpsc::Sender<Envelope>,
    state: watch::Receiver<SignupSession>,
}

impl SignupHandle {
    /// Submit a command and wait until it is accepted or rejected. Request
    /// outcomes are published through [`SignupHandle::subscribe`].
    ///
    /// # Errors
    /// The rejection reason, or `Closed` when the controller task is gone.
    pub async fn send(&self, command: SignupCommand) -> Result<(), SignupError> {
        let (reply, accepted) = oneshot::channel();
        self.commands
            .send((command, reply))
            .await
            .map_err(|_| SignupError::Closed)?;
        accepted.await.map_err(|_| SignupError::Closed)?
    }

    pub fn subscribe(&self) -> watch::Receiver<SignupSession> {
        self.state.clone()
    }

    pub fn session(&self) -> SignupSession {
        self.state.borrow().clone()
    }
}

/// Run the controller on its own task. It stops once every handle is dropped.
pub fn spawn<A: SignupApi>(controller: SignupController<A>) -> SignupHandle {
    let (commands, inbox) = mpsc::channel(COMMAND_QUEUE);
    let (publish, state) = watch::channel(controller.session().clone());
    tokio::spawn(run_controller(controller, inbox, publish));
    SignupHandle { commands, state }
}

async fn run_controller<A: SignupApi>(
    mut controller: SignupController<A>,
    mut inbox: mpsc::Receiver<Envelope>,
    publish: watch::Sender<SignupSession>,
) {
    let (done_tx, mut done_rx) = mpsc::channel::<Completion>(1);

    loop {
        tokio::select! {
            envelope = inbox.recv() => {
                let Some((command, reply)) = envelope else {
                    break;
                };
                let accepted = match controller.dispatch(command) {
                    Ok(Some(call)) => {
                        let api = Arc::clone(&controller.api);
                        let limit = controller.request_timeout;
                        let done = done_tx.clone();
                        tokio::spawn(async move {
                            let _ = done.send(perform(api, call, limit).await).await;
                        });
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(err) => Err(err),
                };
                publish.send_replace(controller.session().clone());
                let _ = reply.send(accepted);
            }
            Some((request, result)) = done_rx.recv() => {
                let _ = controller.finish(request, result);
                publish.send_replace(controller.session().clone());
            }
        }
    }

    debug!("signup controller stopped");
}
