//! Resend email provider implementation.

use super::{Delivery, EmailError, EmailProvider, OutgoingEmail};
use async_trait::async_trait;
use resend_rs::{types::CreateEmailBaseOptions, Resend};

/// Resend email provider.
pub struct ResendProvider {
    client: Resend,
}

impl ResendProvider {
    /// Create a new Resend provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Resend::new(&api_key),
        }
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, EmailError> {
        let options = CreateEmailBaseOptions::new(
            email.from.clone(),
            vec![email.to.clone()],
            email.subject.clone(),
        )
        .with_text(&email.text)
        .with_html(&email.html);

        let response = self
            .client
            .emails
            .send(options)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(Delivery {
            message_id: Some(response.id.to_string()),
        })
    }
}
