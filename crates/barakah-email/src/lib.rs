//! Outbound email for barakah.
//!
//! Providers deliver an already-rendered [`OutgoingEmail`]; the [`Mailer`]
//! renders one-time-passcode templates and addresses them.

mod mailer;
#[cfg(feature = "email-resend")]
mod resend;
#[cfg(feature = "email-smtp")]
mod smtp;
mod templates;

pub use mailer::Mailer;
pub use templates::OtpEmailContent;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Email sending error
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),
}

/// Email provider configuration
#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    /// Resend email provider
    Resend {
        /// Resend API key
        api_key: String,
    },
    /// SMTP email provider
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        /// Port 465 uses implicit TLS, any other port STARTTLS
        use_tls: bool,
    },
}

/// A rendered message ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// `Name <address>` or a bare address
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Provider acknowledgement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: Option<String>,
}

/// Trait for email providers
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Deliver one message.
    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, EmailError>;
}

/// Create an email provider from configuration
pub fn create_provider(config: &EmailProviderConfig) -> Result<Arc<dyn EmailProvider>, EmailError> {
    match config {
        #[cfg(feature = "email-resend")]
        EmailProviderConfig::Resend { api_key } => {
            if api_key.is_empty() {
                return Err(EmailError::InvalidConfig("empty Resend API key".to_string()));
            }
            Ok(Arc::new(resend::ResendProvider::new(api_key.clone())))
        }
        #[cfg(not(feature = "email-resend"))]
        EmailProviderConfig::Resend { .. } => Err(EmailError::ProviderNotAvailable(
            "Resend support not compiled in. Enable the 'email-resend' feature.".to_string(),
        )),
        #[cfg(feature = "email-smtp")]
        EmailProviderConfig::Smtp {
            host,
            port,
            username,
            password,
            use_tls,
        } => {
            let provider = smtp::SmtpProvider::new(
                host.clone(),
                *port,
                username.clone(),
                password.clone(),
                *use_tls,
            )?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "email-smtp"))]
        EmailProviderConfig::Smtp { .. } => Err(EmailError::ProviderNotAvailable(
            "SMTP support not compiled in. Enable the 'email-smtp' feature.".to_string(),
        )),
    }
}
