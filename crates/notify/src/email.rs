//! SMTP email alert sink via `lettre`.
//!
//! Port 465 uses implicit TLS, other ports use STARTTLS unless TLS is
//! disabled. Credentials come from `SMTP_USERNAME` / `SMTP_PASSWORD`.

use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use skytrack_core::config::NotifyConfig;

use crate::traits::{Alert, AlertSink, NotifyError};

#[derive(Debug)]
pub struct EmailAlertSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailAlertSink {
    pub fn from_config(
        smtp_host: &str,
        smtp_port: u16,
        tls: bool,
        from: &str,
        to: &[String],
    ) -> Result<Self, NotifyError> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let to_mailboxes: Vec<Mailbox> = to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if to_mailboxes.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = if smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(smtp_port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
            to: to_mailboxes,
        })
    }

    /// `None` when the SMTP section is incomplete.
    pub fn from_notify_config(config: &NotifyConfig) -> Option<Result<Self, NotifyError>> {
        if !config.email_configured() {
            return None;
        }
        let host = config.smtp_host.as_deref()?;
        let from = config.smtp_from.as_deref()?;
        Some(Self::from_config(
            host,
            config.smtp_port,
            config.smtp_tls,
            from,
            &config.smtp_to,
        ))
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len()
    }
}

#[async_trait::async_trait]
impl AlertSink for EmailAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut message_builder = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            message_builder = message_builder.to(recipient.clone());
        }

        let email = message_builder
            .subject(&alert.subject)
            .body(alert.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %alert.subject,
            recipients = self.to.len(),
            "alert delivered"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
