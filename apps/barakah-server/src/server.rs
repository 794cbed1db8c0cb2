//! Shared handler state and the HTTP router.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use barakah_audit::AuditLog;
use barakah_bank::BankClient;
use barakah_core::{
    Clock, OtpEngine, OtpPolicy, PasswordResetFlow, Registration, TransactionSync,
};
use barakah_email::Mailer;
use barakah_store_sqlite::SqliteStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub otp: OtpEngine,
    pub reset: PasswordResetFlow,
    pub registration: Registration,
    pub mailer: Option<Mailer>,
    pub sync: Option<TransactionSync>,
    pub audit: Arc<dyn AuditLog>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every flow to the SQLite store, which also serves as audit log
    /// and identity provider.
    pub fn new(
        store: Arc<SqliteStore>,
        mailer: Option<Mailer>,
        bank: Option<Arc<dyn BankClient>>,
        clock: Arc<dyn Clock>,
        upstream_timeout: Duration,
    ) -> Self {
        let policy = OtpPolicy {
            upstream_timeout,
            ..OtpPolicy::default()
        };
        let otp = OtpEngine::new(
            store.clone(),
            mailer.clone(),
            store.clone(),
            clock.clone(),
            policy,
        );
        let reset = PasswordResetFlow::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            otp.clone(),
        );
        let registration = Registration::new(store.clone(), store.clone(), otp.clone(), store.clone());
        let sync = bank.map(|bank| {
            TransactionSync::new(store.clone(), bank, store.clone(), clock, upstream_timeout)
        });

        Self {
            otp,
            reset,
            registration,
            mailer,
            sync,
            audit: store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/email/otp", post(handlers::email::send_otp_email))
        .route("/v1/otp/send", post(handlers::otp::send_code))
        .route("/v1/otp/verify", post(handlers::otp::verify_code))
        .route("/v1/otp/lock", get(handlers::otp::lock_status))
        .route(
            "/v1/password/verify-code",
            post(handlers::password::verify_reset_code),
        )
        .route("/v1/password/reset", post(handlers::password::reset_password))
        .route("/v1/users/register", post(handlers::users::register))
        .route("/v1/transactions/sync", post(handlers::transactions::sync))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::NOT_FOUND)
}
