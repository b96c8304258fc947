use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::digest::EmailPayload;
use crate::plugins::traits::Mailer;
use crate::{AppError, Result};

const IMPLICIT_TLS_PORT: u16 = 465;

pub struct EmailNotifier {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address).parse()?;
        let recipients = config
            .recipients
            .iter()
            .map(|r| r.parse::<Mailbox>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(AppError::Email("no recipients configured".to_string()));
        }

        let builder = if !config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            from,
            recipients,
            transport: builder.build(),
        })
    }

    fn build_message(&self, payload: &EmailPayload) -> Result<Message> {
        let mut builder = Message::builder().from(self.from.clone()).subject(payload.subject.clone());
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_PLAIN)
                        .body(payload.body.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_HTML)
                        .body(payload.html.clone()),
                ),
        )?;
        Ok(message)
    }

    pub async fn test_connection(&self) -> Result<bool> {
        Ok(self.transport.test_connection().await?)
    }
}

#[async_trait]
impl Mailer for EmailNotifier {
    async fn send(&self, payload: &EmailPayload) -> Result<()> {
        let message = self.build_message(payload)?;
        self.transport.send(message).await?;
        tracing::info!("Sent email '{}' to {} recipient(s)", payload.subject, self.recipients.len());
        Ok(())
    }
}
