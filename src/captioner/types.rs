//! Common types for image captioning.

use serde::{Deserialize, Serialize};

/// Which model in the fallback chain produced a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Primary,
    #[serde(rename = "fallback_1")]
    Fallback1,
    #[serde(rename = "fallback_2")]
    Fallback2,
}

impl ModelTier {
    /// Map a position in the fallback chain to a tier.
    ///
    /// Chains longer than three models collapse onto the last tier.
    pub fn from_chain_index(index: usize) -> Self {
        match index {
            0 => ModelTier::Primary,
            1 => ModelTier::Fallback1,
            _ => ModelTier::Fallback2,
        }
    }
}

/// A caption produced for an uploaded image. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCaption {
    pub text: String,
    pub model_used: ModelTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_index_mapping() {
        assert_eq!(ModelTier::from_chain_index(0), ModelTier::Primary);
        assert_eq!(ModelTier::from_chain_index(1), ModelTier::Fallback1);
        assert_eq!(ModelTier::from_chain_index(2), ModelTier::Fallback2);
        assert_eq!(ModelTier::from_chain_index(7), ModelTier::Fallback2);
    }

    #[test]
    fn test_tier_serialization() {
        let json = serde_json::to_string(&ModelTier::Fallback1).unwrap();
        assert_eq!(json, "\"fallback_1\"");
        let json = serde_json::to_string(&ModelTier::Primary).unwrap();
        assert_eq!(json, "\"primary\"");
    }
}
