use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use thiserror::Error;
use tracing::debug;

use crate::token_store::LocalStore;

/// Why a stream image could not be loaded. The retry policy does not
/// distinguish between these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("stream request failed: {0}")]
    Network(String),
    #[error("stream responded with status {0}")]
    Status(u16),
    #[error("stream is not an image: {0}")]
    NotAnImage(String),
    #[error("stream returned no data")]
    Empty,
    #[error("stream load timed out after {0:?}")]
    TimedOut(Duration),
}

/// Image-load primitive: resolves once the resource at `url` is displayable.
#[async_trait]
pub trait StreamLoader: Send + Sync + 'static {
    async fn load(&self, url: &str) -> Result<(), LoadError>;
}

/// Loads camera streams over HTTP.
///
/// A stream counts as loaded once the backend answers 2xx with an image or
/// MJPEG body and the first chunk of data arrives.
pub struct HttpStreamLoader {
    client: reqwest::Client,
    store: Arc<LocalStore>,
}

impl HttpStreamLoader {
    pub fn new(client: reqwest::Client, store: Arc<LocalStore>) -> Self {
        Self { client, store }
    }
}

fn is_image_content(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("image/") || content_type.starts_with("multipart/x-mixed-replace")
}

#[async_trait]
impl StreamLoader for HttpStreamLoader {
    async fn load(&self, url: &str) -> Result<(), LoadError> {
        let mut request = self.client.get(url).header(CACHE_CONTROL, "no-cache");
        if let Some(token) = self.store.auth_token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| LoadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_image_content(&content_type) {
            return Err(LoadError::NotAnImage(content_type));
        }

        match response.chunk().await {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                debug!("🖼️ First stream chunk from {}: {} bytes", url, chunk.len());
                Ok(())
            }
            Ok(_) => Err(LoadError::Empty),
            Err(e) => Err(LoadError::Network(e.to_string())),
        }
    }
}
