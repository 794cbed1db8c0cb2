//! SMTP email provider implementation.

use super::{Delivery, EmailError, EmailProvider, OutgoingEmail};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// SMTP email provider.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpProvider {
    /// Create a new SMTP provider.
    pub fn new(
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        use_tls: bool,
    ) -> Result<Self, EmailError> {
        let mut builder = if use_tls {
            let tls_params = TlsParameters::new(host.clone()).map_err(|e| {
                EmailError::InvalidConfig(format!("TLS configuration error: {}", e))
            })?;

            // Port 465 uses implicit TLS (SMTPS), other ports use STARTTLS
            if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                    .map_err(|e| EmailError::InvalidConfig(format!("SMTP relay error: {}", e)))?
                    .port(port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                    .map_err(|e| EmailError::InvalidConfig(format!("SMTP relay error: {}", e)))?
                    .port(port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host).port(port)
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, EmailError> {
        let message = Message::builder()
            .from(
                email
                    .from
                    .parse()
                    .map_err(|e| EmailError::InvalidConfig(format!("Invalid from address: {}", e)))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| EmailError::SendFailed(format!("Invalid to address: {}", e)))?)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )
            .map_err(|e| EmailError::SendFailed(format!("Failed to build email: {}", e)))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        // Servers usually echo a queue id in the 250 reply text.
        let reply = response.message().collect::<Vec<_>>().join(" ");
        Ok(Delivery {
            message_id: (!reply.is_empty()).then_some(reply),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation_no_tls() {
        let provider = SmtpProvider::new("localhost".to_string(), 25, None, None, false);
        assert!(provider.is_ok());
    }

    #[test]
    fn test_provider_creation_with_credentials() {
        let provider = SmtpProvider::new(
            "localhost".to_string(),
            587,
            Some("user".to_string()),
            Some("pass".to_string()),
            false,
        );
        assert!(provider.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_send_failure() {
        let provider = SmtpProvider::new("localhost".to_string(), 2525, None, None, false).unwrap();
        let email = OutgoingEmail {
            from: "noreply@barakah.app".into(),
            to: "not an address".into(),
            subject: "s".into(),
            text: "t".into(),
            html: "h".into(),
        };
        let err = provider.send(&email).await.unwrap_err();
        assert!(matches!(err, EmailError::SendFailed(_)));
    }
}
