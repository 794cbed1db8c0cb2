//! Addressing and rendering of passcode emails.

use barakah_storage::OtpPurpose;
use std::sync::Arc;

use crate::{Delivery, EmailError, EmailProvider, OtpEmailContent, OutgoingEmail};

/// Renders passcode emails and hands them to the configured provider.
#[derive(Clone)]
pub struct Mailer {
    provider: Arc<dyn EmailProvider>,
    from_address: String,
    from_name: Option<String>,
}

impl Mailer {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        from_address: impl Into<String>,
        from_name: Option<String>,
    ) -> Self {
        Self {
            provider,
            from_address: from_address.into(),
            from_name,
        }
    }

    fn from_header(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{} <{}>", name, self.from_address),
            None => self.from_address.clone(),
        }
    }

    /// Send `code` to `to`. `valid_minutes` is only used in the wording.
    pub async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        valid_minutes: i64,
    ) -> Result<Delivery, EmailError> {
        let content = OtpEmailContent::new(code, purpose, valid_minutes);
        let email = OutgoingEmail {
            from: self.from_header(),
            to: to.to_string(),
            subject: content.subject,
            text: content.text,
            html: content.html,
        };
        let delivery = self.provider.send(&email).await?;
        tracing::debug!(
            purpose = %purpose,
            message_id = delivery.message_id.as_deref().unwrap_or("-"),
            "otp email handed to provider"
        );
        Ok(delivery)
    }
}
