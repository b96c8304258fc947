use async_trait::async_trait;

use crate::Result;
use crate::digest::EmailPayload;

/// Outbound digest delivery (SMTP in production).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, payload: &EmailPayload) -> Result<()>;
}
