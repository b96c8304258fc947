//! Request/reply channel between the scanners and the outbound services.
//!
//! Scanners never talk to SMTP or object storage directly: they post a
//! [`Message`] and await the [`Reply`] the coordinator produces.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::digest::EmailPayload;
use crate::plugins::{ImageUploader, Mailer};
use crate::{AppError, Result};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    SendEmail(EmailPayload),
    UploadImage(UploadPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub base64_image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn uploaded(url: String) -> Self {
        Self {
            success: true,
            url: Some(url),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            url: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub reply: oneshot::Sender<Reply>,
}

/// Scanner-side handle.
#[derive(Debug, Clone)]
pub struct Relay {
    tx: mpsc::Sender<Envelope>,
}

impl Relay {
    pub fn channel(capacity: usize) -> (Relay, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Relay { tx }, rx)
    }

    pub async fn request(&self, message: Message) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| AppError::RelayClosed)?;
        rx.await.map_err(|_| AppError::RelayClosed)
    }

    pub async fn send_email(&self, payload: EmailPayload) -> Result<Reply> {
        self.request(Message::SendEmail(payload)).await
    }

    pub async fn upload_image(&self, png: &[u8]) -> Result<Reply> {
        self.request(Message::UploadImage(UploadPayload {
            base64_image: encode_png_data_url(png),
        }))
        .await
    }
}

pub fn encode_png_data_url(png: &[u8]) -> String {
    format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(png))
}

/// Accepts either a PNG data URL or bare base64.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>> {
    let encoded = match data.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, body)| body)
            .ok_or_else(|| AppError::Upload("data URL is not base64 encoded".to_string()))?,
        None => data,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::Upload(format!("invalid base64 image: {}", e)))
}

/// Outbound side: the services a [`Message`] is dispatched to.
#[derive(Clone)]
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub uploader: Option<Arc<dyn ImageUploader>>,
}

impl Services {
    pub async fn dispatch(&self, message: Message) -> Reply {
        match message {
            Message::SendEmail(payload) => match self.mailer.send(&payload).await {
                Ok(()) => {
                    metrics::counter!("notifier_emails_sent_total").increment(1);
                    Reply::ok()
                }
                Err(e) => {
                    tracing::error!("Failed to send email '{}': {}", payload.subject, e);
                    metrics::counter!("notifier_email_failures_total").increment(1);
                    Reply::failed(e)
                }
            },
            Message::UploadImage(payload) => {
                let Some(uploader) = &self.uploader else {
                    return Reply::failed("image upload is disabled");
                };
                let png = match decode_data_url(&payload.base64_image) {
                    Ok(png) => png,
                    Err(e) => return Reply::failed(e),
                };
                match uploader.upload(png).await {
                    Ok(url) => {
                        metrics::counter!("notifier_uploads_total").increment(1);
                        Reply::uploaded(url)
                    }
                    Err(e) => {
                        tracing::error!("Failed to upload image: {}", e);
                        metrics::counter!("notifier_upload_failures_total").increment(1);
                        Reply::failed(e)
                    }
                }
            }
        }
    }
}
