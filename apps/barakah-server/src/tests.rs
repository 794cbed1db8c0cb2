use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use barakah_bank::{BankClient, BankTransaction, MockBankClient};
use barakah_core::{ManualClock, SystemClock};
use barakah_audit::{AuditAction, AuditLog, AuditLogFilter, AuditResult};
use barakah_email::{Delivery, EmailError, EmailProvider, Mailer, MockEmailProvider, OutgoingEmail};
use barakah_storage::{IdentityProvider, OtpPurpose, Store};
use barakah_store_sqlite::SqliteStore;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::server::{router, AppState};

const TIMEOUT: Duration = Duration::from_secs(30);

fn mailer(fail: bool) -> Mailer {
    let mut provider = MockEmailProvider::new();
    provider.expect_send().returning(move |_| {
        if fail {
            Err(EmailError::SendFailed("connection refused".into()))
        } else {
            Ok(Delivery {
                message_id: Some("msg-42".into()),
            })
        }
    });
    Mailer::new(Arc::new(provider), "no-reply@barakah.app", None)
}

async fn app(mailer: Option<Mailer>) -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let state = AppState::new(store.clone(), mailer, None, Arc::new(SystemClock), TIMEOUT);
    (router(state), store)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_healthz() {
    let (app, _) = app(None).await;
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_not_installed() {
    let (app, _) = app(None).await;
    let (status, _) = call(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_email_otp_validation() {
    let (app, _) = app(Some(mailer(false))).await;

    let (status, body) = call(&app, "POST", "/v1/email/otp", Some(json!({ "email": "a@b.com" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Email and OTP are required");

    let (status, body) = call(
        &app,
        "POST",
        "/v1/email/otp",
        Some(json!({ "email": "not-an-email", "otp": "123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email address");
}

#[tokio::test]
async fn test_email_otp_sends() {
    let (app, store) = app(Some(mailer(false))).await;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/email/otp",
        Some(json!({ "email": "A@B.com", "otp": "123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["messageId"], "msg-42");

    // Delivering a code does not create an OTP record
    assert!(store.get_otp("a@b.com").await.is_err());
}

#[tokio::test]
async fn test_email_otp_fails_closed_without_provider() {
    let (app, _) = app(None).await;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/email/otp",
        Some(json!({ "email": "a@b.com", "otp": "123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_email_otp_provider_failure() {
    let (app, _) = app(Some(mailer(true))).await;
    let (status, _) = call(
        &app,
        "POST",
        "/v1/email/otp",
        Some(json!({ "email": "a@b.com", "otp": "123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

struct StalledProvider;

#[async_trait::async_trait]
impl EmailProvider for StalledProvider {
    async fn send(&self, _email: &OutgoingEmail) -> Result<Delivery, EmailError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_email_otp_provider_timeout() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let mailer = Mailer::new(Arc::new(StalledProvider), "no-reply@barakah.app", None);
    let state = AppState::new(
        store.clone(),
        Some(mailer),
        None,
        Arc::new(SystemClock),
        Duration::from_millis(50),
    );
    let app = router(state);

    let (status, body) = tokio::time::timeout(
        Duration::from_secs(5),
        call(
            &app,
            "POST",
            "/v1/email/otp",
            Some(json!({ "email": "a@b.com", "otp": "123456" })),
        ),
    )
    .await
    .expect("handler should give up on a stalled provider");
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to send OTP email");

    let sends = store
        .query(AuditLogFilter::new().action(AuditAction::EmailSend))
        .await
        .unwrap();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].result, AuditResult::Error);
    assert!(sends[0].reason.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn test_send_verify_and_lock() {
    let (app, store) = app(Some(mailer(false))).await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/otp/send",
        Some(json!({ "email": "a@b.com", "purpose": "login" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], true);

    let code = store.get_otp("a@b.com").await.unwrap().code;
    let wrong = if code == "100000" { "100001" } else { "100000" };

    let (status, body) = call(
        &app,
        "POST",
        "/v1/otp/verify",
        Some(json!({ "email": "a@b.com", "code": wrong, "purpose": "login" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "invalid_code");
    assert_eq!(body["attemptsRemaining"], 4);

    for _ in 0..4 {
        call(
            &app,
            "POST",
            "/v1/otp/verify",
            Some(json!({ "email": "a@b.com", "code": wrong, "purpose": "login" })),
        )
        .await;
    }

    let (status, body) = call(&app, "GET", "/v1/otp/lock?email=a@b.com", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locked"], true);
    assert!(body["unlockAt"].is_string());

    let (status, body) = call(
        &app,
        "POST",
        "/v1/otp/send",
        Some(json!({ "email": "a@b.com", "purpose": "login" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["unlockAt"].is_string());
}

#[tokio::test]
async fn test_verify_rejects_bad_purpose_and_code() {
    let (app, _) = app(None).await;
    let (status, _) = call(
        &app,
        "POST",
        "/v1/otp/verify",
        Some(json!({ "email": "a@b.com", "code": "123456", "purpose": "delete_account" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/otp/verify",
        Some(json!({ "email": "a@b.com", "code": "12ab56" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_password_reset_over_http() {
    let (app, store) = app(Some(mailer(false))).await;
    store.create_user("a@b.com", "old-secret").await.unwrap();

    let (status, _) = call(
        &app,
        "POST",
        "/v1/otp/send",
        Some(json!({ "email": "a@b.com", "purpose": "forgot_password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let record = store.get_otp("a@b.com").await.unwrap();
    assert_eq!(record.purpose, OtpPurpose::ForgotPassword);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/password/verify-code",
        Some(json!({ "email": "a@b.com", "code": record.code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["otpVerificationToken"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "POST",
        "/v1/password/reset",
        Some(json!({ "email": "a@b.com", "newPassword": "new-secret", "otpVerificationToken": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/password/reset",
        Some(json!({ "email": "a@b.com", "newPassword": "short", "otpVerificationToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/password/reset",
        Some(json!({ "email": "a@b.com", "newPassword": "new-secret", "otpVerificationToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(store.verify_credentials("a@b.com", "new-secret").await.is_ok());

    let (status, _) = call(
        &app,
        "POST",
        "/v1/password/reset",
        Some(json!({ "email": "a@b.com", "newPassword": "new-secret", "otpVerificationToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register() {
    let (app, store) = app(Some(mailer(false))).await;
    let request = json!({ "fullName": "Amina Khan", "email": "amina@example.com", "password": "secret1" });

    let (status, body) = call(&app, "POST", "/v1/users/register", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["codeDelivered"], true);
    let profile = store.get_profile_by_email("amina@example.com").await.unwrap();
    assert_eq!(body["userId"], profile.id.to_string());

    let (status, _) = call(&app, "POST", "/v1/users/register", Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/users/register",
        Some(json!({ "fullName": "X", "email": "x@example.com", "password": "123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_requires_bank() {
    let (app, _) = app(None).await;
    let (status, _) = call(
        &app,
        "POST",
        "/v1/transactions/sync",
        Some(json!({ "userId": uuid::Uuid::now_v7().to_string(), "accessToken": "at" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_sync_inserts() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let mut bank = MockBankClient::new();
    bank.expect_list_transactions().returning(|_, _| {
        Ok(vec![BankTransaction {
            transaction_id: "tx-1".into(),
            merchant_name: Some("Aldi".into()),
            description: String::new(),
            amount: -3.0,
            currency: None,
            posted_date: "2024-05-01".into(),
            categories: vec![],
        }])
    });
    let bank: Arc<dyn BankClient> = Arc::new(bank);
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()));
    let state = AppState::new(store.clone(), None, Some(bank), clock, TIMEOUT);
    let app = router(state);
    let user_id = uuid::Uuid::now_v7().to_string();

    let (status, body) = call(
        &app,
        "POST",
        "/v1/transactions/sync",
        Some(json!({ "userId": user_id, "accessToken": "at" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 1);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/transactions/sync",
        Some(json!({ "userId": user_id, "accessToken": "at" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 0);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/transactions/sync",
        Some(json!({ "userId": "not-a-uuid", "accessToken": "at" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
