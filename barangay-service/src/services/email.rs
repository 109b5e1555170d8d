//! Resident email notices.
//!
//! Delivery is handed to an `EmailProvider` on a spawned task after the
//! workflow commits. Failures are logged and counted, never returned.

use crate::config::SmtpConfig;
use crate::models::{Certificate, Payment};
use crate::services::metrics::record_notification;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;

/// A plain-text email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpEmailProvider {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailProvider {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mut builder = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(e.to_string()))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().clone(),
            ));
        }

        tracing::info!(host = %config.host, port = config.port, "SMTP email provider initialized");

        Ok(Self {
            mailer: builder.build(),
            from_email: config.from_email.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body)
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        // SmtpTransport is blocking.
        let mailer = self.mailer.clone();
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Provider used when no SMTP relay is configured.
#[derive(Clone, Default)]
pub struct LoggingEmailProvider;

#[async_trait]
impl EmailProvider for LoggingEmailProvider {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "SMTP not configured, email not sent"
        );
        Ok(())
    }
}

/// Builds resident notices and dispatches them without blocking the caller.
#[derive(Clone)]
pub struct Notifier {
    provider: Arc<dyn EmailProvider>,
}

impl Notifier {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self { provider }
    }

    pub fn from_config(config: Option<&SmtpConfig>) -> Result<Self, AppError> {
        let provider: Arc<dyn EmailProvider> = match config {
            Some(smtp) => Arc::new(SmtpEmailProvider::new(smtp)?),
            None => {
                tracing::info!("SMTP_HOST not set, emails will only be logged");
                Arc::new(LoggingEmailProvider)
            }
        };
        Ok(Self::new(provider))
    }

    pub fn dispatch(&self, message: Option<EmailMessage>) {
        let Some(message) = message else {
            return;
        };
        let provider = self.provider.clone();
        tokio::spawn(async move {
            let to = message.to.clone();
            match provider.send(message).await {
                Ok(()) => record_notification("sent"),
                Err(e) => {
                    record_notification("failed");
                    tracing::warn!(error = %e, to = %to, "Failed to send notification");
                }
            }
        });
    }
}

fn recipient(email: Option<&str>) -> Option<String> {
    email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

pub fn certificate_approved(
    email: Option<&str>,
    resident_name: &str,
    type_name: &str,
    certificate: &Certificate,
) -> Option<EmailMessage> {
    Some(EmailMessage {
        to: recipient(email)?,
        subject: format!("{} request approved", type_name),
        body: format!(
            "Hello {},\n\nYour request for a {} has been approved.\nCertificate number: {}\n\nWe will notify you once it is ready for payment and release.",
            resident_name,
            type_name,
            certificate.certificate_number.as_deref().unwrap_or("pending")
        ),
    })
}

pub fn certificate_rejected(
    email: Option<&str>,
    resident_name: &str,
    type_name: &str,
    reason: &str,
) -> Option<EmailMessage> {
    Some(EmailMessage {
        to: recipient(email)?,
        subject: format!("{} request rejected", type_name),
        body: format!(
            "Hello {},\n\nYour request for a {} was not approved.\nReason: {}\n\nPlease visit the barangay hall if you have questions.",
            resident_name, type_name, reason
        ),
    })
}

pub fn certificate_completed(
    email: Option<&str>,
    resident_name: &str,
    type_name: &str,
    payment: &Payment,
) -> Option<EmailMessage> {
    Some(EmailMessage {
        to: recipient(email)?,
        subject: format!("{} ready for payment", type_name),
        body: format!(
            "Hello {},\n\nYour {} is ready. Please settle the fee of ₱{:.2} (payment reference {}) at the barangay hall.",
            resident_name, type_name, payment.total_amount, payment.payment_number
        ),
    })
}

pub fn payment_received(payment: &Payment) -> Option<EmailMessage> {
    Some(EmailMessage {
        to: recipient(payment.payer_email.as_deref())?,
        subject: format!(
            "Payment receipt {}",
            payment.receipt_number.as_deref().unwrap_or(&payment.payment_number)
        ),
        body: format!(
            "Hello {},\n\nWe received your payment of ₱{:.2} for {}.\nReceipt number: {}\nPayment number: {}",
            payment.payer_name,
            payment.total_amount,
            payment
                .service_description
                .as_deref()
                .unwrap_or(&payment.service_type),
            payment.receipt_number.as_deref().unwrap_or("-"),
            payment.payment_number
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailProvider for RecordingProvider {
        async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[test]
    fn no_message_without_recipient() {
        assert!(certificate_rejected(None, "Juan", "Barangay Clearance", "Incomplete").is_none());
        assert!(
            certificate_rejected(Some("  "), "Juan", "Barangay Clearance", "Incomplete").is_none()
        );
    }

    #[test]
    fn rejection_notice_includes_reason() {
        let message = certificate_rejected(
            Some("juan@example.com"),
            "Juan",
            "Barangay Clearance",
            "Missing valid ID",
        )
        .unwrap();
        assert_eq!(message.to, "juan@example.com");
        assert!(message.body.contains("Missing valid ID"));
    }

    #[tokio::test]
    async fn dispatch_hands_message_to_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let notifier = Notifier::new(provider.clone());

        notifier.dispatch(Some(EmailMessage {
            to: "clerk@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        }));

        for _ in 0..50 {
            if !provider.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(provider.sent.lock().unwrap().len(), 1);
    }
}
