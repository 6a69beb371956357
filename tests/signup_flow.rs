//! End-to-end signup against a running service.
//!
//! Each test starts the full axum app on an ephemeral port with the in-memory
//! store, a recording email sender and no rate limiting, then drives it
//! through `HttpSignupApi` and the signup controller.

use anyhow::{Context, Result, anyhow};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tutorhub::api::{
    self, AuthConfig, AuthState, MemoryStore, NoopRateLimiter, Role, Store,
    email::{EmailMessage, EmailSender, EmailWorkerConfig, spawn_outbox_worker},
};
use tutorhub::signup::{
    HttpSignupApi, SIGN_IN_PATH, SignupApi, SignupController, SignupError, Step,
};

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<EmailMessage>>,
}

impl EmailSender for RecordingSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording sender poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

impl RecordingSender {
    async fn code_for(&self, email: &str) -> Result<String> {
        for _ in 0..200 {
            let payload = {
                let sent = self.sent.lock().map_err(|_| anyhow!("poisoned"))?;
                sent.iter()
                    .rev()
                    .find(|message| message.to_email == email)
                    .map(|message| message.payload_json.clone())
            };
            if let Some(payload) = payload {
                let payload: serde_json::Value = serde_json::from_str(&payload)?;
                return payload["code"]
                    .as_str()
                    .map(str::to_string)
                    .context("payload without code");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(anyhow!("no verification email for {email}"))
    }
}

struct Service {
    base_url: String,
    memory: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
}

fn shipped_config() -> AuthConfig {
    AuthConfig::new("http://localhost:3000".to_string())
}

async fn start_service() -> Result<Service> {
    start_service_with(shipped_config().with_resend_cooldown_seconds(0), true).await
}

async fn start_service_with(config: AuthConfig, outbox_running: bool) -> Result<Service> {
    let memory = Arc::new(MemoryStore::new());
    let sender = Arc::new(RecordingSender::default());
    let (outbox, worker) = spawn_outbox_worker(sender.clone(), EmailWorkerConfig::default());
    if !outbox_running {
        worker.abort();
        let _ = worker.await;
    }
    let auth_state = Arc::new(AuthState::new(config, Arc::new(NoopRateLimiter), outbox));
    let app = api::app(Store::Memory(memory.clone()), auth_state)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    Ok(Service {
        base_url: format!("http://{addr}"),
        memory,
        sender,
    })
}

#[tokio::test]
async fn controller_signs_up_a_new_tutor() -> Result<()> {
    let service = start_service().await?;
    let mut controller = SignupController::new(HttpSignupApi::new(&service.base_url)?);

    let message = controller.request_verification("a@b.com").await?;
    assert_eq!(message, "Verification code sent to email.");
    assert_eq!(controller.session().step, Step::CodeVerification);

    let code = service.sender.code_for("a@b.com").await?;
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let result = controller.validate_code(wrong).await;
    assert!(matches!(result, Err(SignupError::Request { status: 400, .. })));
    assert_eq!(controller.session().step, Step::CodeVerification);
    assert_eq!(
        controller.session().error.as_deref(),
        Some("Invalid or expired token.")
    );

    let message = controller.validate_code(&code).await?;
    assert_eq!(message, "Email verified successfully!");
    assert_eq!(controller.session().step, Step::PasswordSetup);

    controller.set_password("abcdef", "abcdef")?;
    let redirect = controller.register().await?;
    assert_eq!(redirect, SIGN_IN_PATH);

    let session = controller.session();
    assert_eq!(session.step, Step::Submitted);
    assert_eq!(session.message.as_deref(), Some("Registration successful!"));

    let user = service
        .memory
        .user("a@b.com")
        .await
        .context("account was not created")?;
    assert!(matches!(user.role, Role::Teacher));
    assert_ne!(user.password_hash, "abcdef");
    Ok(())
}

#[tokio::test]
async fn second_registration_conflicts() -> Result<()> {
    let service = start_service().await?;
    let api = HttpSignupApi::new(&service.base_url)?;

    api.verify_email("dup@b.com").await?;
    let code = service.sender.code_for("dup@b.com").await?;
    api.validate_code("dup@b.com", &code).await?;
    api.register("dup@b.com", "abcdef").await?;

    let result = api.register("dup@b.com", "abcdef").await;
    assert_eq!(
        result,
        Err(SignupError::Request {
            status: 409,
            message: "Email is already registered".to_string(),
        })
    );

    // A registered email cannot start over either.
    let result = api.verify_email("dup@b.com").await;
    assert!(matches!(result, Err(SignupError::Request { status: 409, .. })));
    Ok(())
}

#[tokio::test]
async fn registration_requires_a_validated_code() -> Result<()> {
    let service = start_service().await?;
    let api = HttpSignupApi::new(&service.base_url)?;

    let result = api.register("new@b.com", "abcdef").await;
    assert_eq!(
        result,
        Err(SignupError::Request {
            status: 403,
            message: "Email is not verified".to_string(),
        })
    );

    // Requesting a code is not enough; it has to be validated.
    api.verify_email("new@b.com").await?;
    let result = api.register("new@b.com", "abcdef").await;
    assert!(matches!(result, Err(SignupError::Request { status: 403, .. })));
    assert!(service.memory.user("new@b.com").await.is_none());
    Ok(())
}

#[tokio::test]
async fn code_is_single_use() -> Result<()> {
    let service = start_service().await?;
    let api = HttpSignupApi::new(&service.base_url)?;

    api.verify_email("once@b.com").await?;
    let code = service.sender.code_for("once@b.com").await?;

    let (first, second) = tokio::join!(
        api.validate_code("once@b.com", &code),
        api.validate_code("once@b.com", &code)
    );
    assert_eq!(
        usize::from(first.is_ok()) + usize::from(second.is_ok()),
        1,
        "exactly one validation may succeed"
    );
    Ok(())
}

#[tokio::test]
async fn early_resend_keeps_the_first_code_usable() -> Result<()> {
    let service = start_service_with(shipped_config(), true).await?;
    let mut controller = SignupController::new(HttpSignupApi::new(&service.base_url)?);

    controller.request_verification("a@b.com").await?;
    let code = service.sender.code_for("a@b.com").await?;

    let result = controller.resend().await;
    assert_eq!(
        result,
        Err(SignupError::Request {
            status: 429,
            message: "Please wait before requesting another code".to_string(),
        })
    );
    assert_eq!(controller.session().step, Step::CodeVerification);
    assert!(controller.session().error.is_some());

    controller.validate_code(&code).await?;
    assert_eq!(controller.session().step, Step::PasswordSetup);
    Ok(())
}

#[tokio::test]
async fn stopped_mail_queue_does_not_start_a_cooldown() -> Result<()> {
    let service = start_service_with(shipped_config(), false).await?;
    let api = HttpSignupApi::new(&service.base_url)?;

    for _ in 0..2 {
        let result = api.verify_email("a@b.com").await;
        assert!(matches!(result, Err(SignupError::Request { status: 503, .. })));
    }
    Ok(())
}
