mod fallback;
mod hf_inference;
mod provider;
mod types;

pub use fallback::FallbackCaptioner;
pub use hf_inference::HfInferenceCaptioner;
pub use provider::{Captioner, CaptionerError};
pub use types::{ImageCaption, ModelTier};
