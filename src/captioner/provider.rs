//! Captioning model trait definition.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when calling a captioning model.
#[derive(Debug, Error)]
pub enum CaptionerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,

    #[error("All captioning models failed, last error: {0}")]
    AllModelsFailed(String),
}

/// Trait for image captioning models.
///
/// One implementation wraps one vision model. Trying several models in
/// priority order is handled by [`FallbackCaptioner`](super::FallbackCaptioner).
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Identifier of the underlying model (e.g. "Salesforce/blip-image-captioning-base").
    fn model(&self) -> &str;

    /// Produce a natural-language description of the image bytes.
    async fn caption(&self, image: &[u8]) -> Result<String, CaptionerError>;
}
