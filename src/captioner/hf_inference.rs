//! Hugging Face Inference API captioner.
//!
//! Works with the hosted inference API as well as self-hosted deployments
//! exposing the same `/models/{id}` image-to-text endpoint.

use super::provider::{Captioner, CaptionerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Captioner backed by a Hugging Face style inference endpoint.
pub struct HfInferenceCaptioner {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HfInferenceCaptioner {
    /// Create a new captioner for one model.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the inference API (e.g., "https://api-inference.huggingface.co").
    /// * `model` - Model id (e.g., "Salesforce/blip-image-captioning-base").
    /// * `api_key` - Optional bearer token.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl Captioner for HfInferenceCaptioner {
    fn model(&self) -> &str {
        &self.model
    }

    async fn caption(&self, image: &[u8]) -> Result<String, CaptionerError> {
        let url = format!("{}/models/{}", self.base_url, self.model);

        debug!(
            model = %self.model,
            image_bytes = image.len(),
            "Sending captioning request"
        );

        let mut req_builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec())
            .timeout(self.timeout);

        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CaptionerError::Timeout
            } else {
                CaptionerError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptionerError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: Vec<GeneratedText> = response.json().await.map_err(|e| {
            CaptionerError::InvalidResponse(format!("Failed to parse captioning response: {}", e))
        })?;

        let text = extract_caption(&body).ok_or_else(|| {
            CaptionerError::InvalidResponse("Empty caption in response".to_string())
        })?;

        debug!(model = %self.model, caption = %text, "Caption generated");
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: Option<String>,
}

fn extract_caption(body: &[GeneratedText]) -> Option<String> {
    body.iter()
        .filter_map(|g| g.generated_text.as_deref())
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_caption() {
        let body: Vec<GeneratedText> =
            serde_json::from_str(r#"[{"generated_text": " a dog on a beach "}]"#).unwrap();
        assert_eq!(extract_caption(&body).unwrap(), "a dog on a beach");
    }

    #[test]
    fn test_extract_caption_skips_empty_entries() {
        let body: Vec<GeneratedText> =
            serde_json::from_str(r#"[{"generated_text": ""}, {"generated_text": "city lights"}]"#)
                .unwrap();
        assert_eq!(extract_caption(&body).unwrap(), "city lights");
    }

    #[test]
    fn test_extract_caption_empty_body() {
        let body: Vec<GeneratedText> = serde_json::from_str("[]").unwrap();
        assert!(extract_caption(&body).is_none());
    }
}
