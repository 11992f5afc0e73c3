//! Ordered fallback chain over captioning models.
//!
//! Models are tried in priority order until one produces a caption. The
//! position of the winning model is reported in the resulting
//! [`ImageCaption::model_used`].

use super::provider::{Captioner, CaptionerError};
use super::types::{ImageCaption, ModelTier};
use tracing::{info, warn};

pub struct FallbackCaptioner {
    chain: Vec<Box<dyn Captioner>>,
}

impl FallbackCaptioner {
    /// Build a chain from models in priority order. Must not be empty.
    pub fn new(chain: Vec<Box<dyn Captioner>>) -> Self {
        assert!(!chain.is_empty(), "captioner chain must not be empty");
        Self { chain }
    }

    /// Model identifiers in priority order.
    pub fn model_names(&self) -> Vec<&str> {
        self.chain.iter().map(|c| c.model()).collect()
    }

    /// Caption the image with the first model in the chain that succeeds.
    ///
    /// Fails only when every model in the chain has failed.
    pub async fn caption(&self, image: &[u8]) -> Result<ImageCaption, CaptionerError> {
        let mut last_error = None;

        for (index, captioner) in self.chain.iter().enumerate() {
            match captioner.caption(image).await {
                Ok(text) => {
                    let tier = ModelTier::from_chain_index(index);
                    if index > 0 {
                        info!(
                            model = captioner.model(),
                            tier = ?tier,
                            "Captioning succeeded on fallback model"
                        );
                    }
                    return Ok(ImageCaption {
                        text,
                        model_used: tier,
                        confidence: None,
                    });
                }
                Err(err) => {
                    warn!(
                        model = captioner.model(),
                        error = %err,
                        "Captioning model failed, trying next in chain"
                    );
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.expect("chain is non-empty");
        Err(CaptionerError::AllModelsFailed(last.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubCaptioner {
        name: &'static str,
        result: Result<&'static str, ()>,
    }

    #[async_trait]
    impl Captioner for StubCaptioner {
        fn model(&self) -> &str {
            self.name
        }

        async fn caption(&self, _image: &[u8]) -> Result<String, CaptionerError> {
            match self.result {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(CaptionerError::Connection("boom".to_string())),
            }
        }
    }

    fn ok(name: &'static str, text: &'static str) -> Box<dyn Captioner> {
        Box::new(StubCaptioner {
            name,
            result: Ok(text),
        })
    }

    fn failing(name: &'static str) -> Box<dyn Captioner> {
        Box::new(StubCaptioner {
            name,
            result: Err(()),
        })
    }

    #[tokio::test]
    async fn primary_success_reports_primary_tier() {
        let chain = FallbackCaptioner::new(vec![ok("blip-large", "a cat"), failing("blip-base")]);
        let caption = chain.caption(b"img").await.unwrap();
        assert_eq!(caption.text, "a cat");
        assert_eq!(caption.model_used, ModelTier::Primary);
    }

    #[tokio::test]
    async fn first_fallback_is_tried_when_primary_fails() {
        let chain = FallbackCaptioner::new(vec![failing("blip-large"), ok("blip-base", "a dog")]);
        let caption = chain.caption(b"img").await.unwrap();
        assert_eq!(caption.text, "a dog");
        assert_eq!(caption.model_used, ModelTier::Fallback1);
    }

    #[tokio::test]
    async fn second_fallback_reports_fallback_2() {
        let chain = FallbackCaptioner::new(vec![
            failing("blip-large"),
            failing("blip-base"),
            ok("git-base", "a tree"),
        ]);
        let caption = chain.caption(b"img").await.unwrap();
        assert_eq!(caption.model_used, ModelTier::Fallback2);
    }

    #[tokio::test]
    async fn all_failures_surface_as_all_models_failed() {
        let chain = FallbackCaptioner::new(vec![failing("a"), failing("b")]);
        let err = chain.caption(b"img").await.unwrap_err();
        assert!(matches!(err, CaptionerError::AllModelsFailed(_)));
    }
}
