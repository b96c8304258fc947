use async_trait::async_trait;

use crate::Result;

/// Stores a PNG screenshot and returns the URL it can be viewed at.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, png: Vec<u8>) -> Result<String>;
}
