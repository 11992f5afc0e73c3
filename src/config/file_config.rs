use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub max_image_mb: Option<usize>,
    pub retention_hours: Option<u64>,
    pub prune_interval_minutes: Option<u64>,

    // Feature configs
    pub captioning: Option<CaptioningConfig>,
    pub llm: Option<LlmConfig>,
    pub catalog: Option<CatalogConfig>,
    pub recommendations: Option<RecommendationsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CaptioningConfig {
    pub base_url: Option<String>,
    /// Fallback chain, tried in order. At most three models.
    pub models: Option<Vec<String>>,
    pub api_key: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Shell command printing the API key, used instead of `api_key`.
    pub api_key_command: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: Option<String>,
    pub auth_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub market: Option<String>,
    pub min_popularity: Option<u32>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RecommendationsConfig {
    pub limit: Option<usize>,
    pub max_keyword_queries: Option<usize>,
    pub per_query_limit: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_parses_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            port = 4000
            logging_level = "body"

            [captioning]
            models = ["model-a", "model-b"]

            [catalog]
            client_id = "id"
            client_secret = "secret"
            min_popularity = 50

            [recommendations]
            limit = 5
            "#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.port, Some(4000));
        assert_eq!(config.logging_level.as_deref(), Some("body"));
        assert_eq!(
            config.captioning.unwrap().models.unwrap(),
            vec!["model-a", "model-b"]
        );
        let catalog = config.catalog.unwrap();
        assert_eq!(catalog.client_id.as_deref(), Some("id"));
        assert_eq!(catalog.min_popularity, Some(50));
        assert_eq!(config.recommendations.unwrap().limit, Some(5));
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(FileConfig::load(Path::new("/nonexistent/config.toml")).is_err());
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.port.is_none());
        assert!(config.captioning.is_none());
    }
}
