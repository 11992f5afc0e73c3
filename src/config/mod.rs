mod file_config;

pub use file_config::{
    CaptioningConfig, CatalogConfig, FileConfig, LlmConfig, RecommendationsConfig,
};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::time::Duration;

const MAX_CAPTIONING_MODELS: usize = 3;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub captioning_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub catalog_client_id: Option<String>,
    pub catalog_client_secret: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            logging_level: RequestsLoggingLevel::default(),
            captioning_api_key: None,
            llm_api_key: None,
            catalog_client_id: None,
            catalog_client_secret: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub max_image_bytes: usize,
    pub retention_hours: u64,
    pub prune_interval_minutes: u64,

    // Feature configs (with defaults)
    pub captioning: CaptioningSettings,
    pub llm: LlmSettings,
    pub catalog: CatalogSettings,
    pub recommendations: RecommendationSettings,
}

#[derive(Debug, Clone)]
pub struct CaptioningSettings {
    pub base_url: String,
    pub models: Vec<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub base_url: String,
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub market: String,
    pub min_popularity: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    pub limit: usize,
    pub max_keyword_queries: usize,
    pub per_query_limit: usize,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let max_image_bytes = file.max_image_mb.unwrap_or(10) * 1024 * 1024;
        let retention_hours = file.retention_hours.unwrap_or(24);
        let prune_interval_minutes = file.prune_interval_minutes.unwrap_or(60);

        let cap_file = file.captioning.unwrap_or_default();
        let captioning = CaptioningSettings {
            base_url: cap_file
                .base_url
                .unwrap_or_else(|| "https://api-inference.huggingface.co".to_string()),
            models: cap_file.models.unwrap_or_else(|| {
                vec![
                    "Salesforce/blip-image-captioning-large".to_string(),
                    "Salesforce/blip-image-captioning-base".to_string(),
                    "microsoft/git-base".to_string(),
                ]
            }),
            api_key: cap_file.api_key.or_else(|| cli.captioning_api_key.clone()),
            timeout: Duration::from_secs(cap_file.timeout_sec.unwrap_or(8)),
        };

        if captioning.models.is_empty() {
            bail!("captioning.models must list at least one model");
        }
        if captioning.models.len() > MAX_CAPTIONING_MODELS {
            bail!(
                "captioning.models supports at most {} models",
                MAX_CAPTIONING_MODELS
            );
        }

        let llm_file = file.llm.unwrap_or_default();
        let llm = LlmSettings {
            base_url: llm_file
                .base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: llm_file.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key: llm_file.api_key.or_else(|| cli.llm_api_key.clone()),
            api_key_command: llm_file.api_key_command,
            temperature: llm_file.temperature.unwrap_or(0.8),
            max_tokens: llm_file.max_tokens.unwrap_or(4000),
            timeout: Duration::from_secs(llm_file.timeout_sec.unwrap_or(8)),
        };

        let cat_file = file.catalog.unwrap_or_default();
        let client_id = cat_file
            .client_id
            .or_else(|| cli.catalog_client_id.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "catalog client_id must be specified via --catalog-client-id or in config file"
                )
            })?;
        let client_secret = cat_file
            .client_secret
            .or_else(|| cli.catalog_client_secret.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "catalog client_secret must be specified via --catalog-client-secret or in config file"
                )
            })?;
        let catalog = CatalogSettings {
            base_url: cat_file
                .base_url
                .unwrap_or_else(|| "https://api.spotify.com/v1".to_string()),
            auth_url: cat_file
                .auth_url
                .unwrap_or_else(|| "https://accounts.spotify.com/api/token".to_string()),
            client_id,
            client_secret,
            market: cat_file.market.unwrap_or_else(|| "US".to_string()),
            min_popularity: cat_file.min_popularity.unwrap_or(35),
            timeout: Duration::from_secs(cat_file.timeout_sec.unwrap_or(5)),
        };

        let rec_file = file.recommendations.unwrap_or_default();
        let recommendations = RecommendationSettings {
            limit: rec_file.limit.unwrap_or(8),
            max_keyword_queries: rec_file.max_keyword_queries.unwrap_or(4),
            per_query_limit: rec_file.per_query_limit.unwrap_or(10),
        };

        if recommendations.limit == 0 {
            bail!("recommendations.limit must be positive");
        }
        if recommendations.max_keyword_queries == 0 {
            bail!("recommendations.max_keyword_queries must be positive");
        }

        Ok(Self {
            port,
            logging_level,
            max_image_bytes,
            retention_hours,
            prune_interval_minutes,
            captioning,
            llm,
            catalog,
            recommendations,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_credentials() -> CliConfig {
        CliConfig {
            catalog_client_id: Some("id".to_string()),
            catalog_client_secret: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("path"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("BODY"),
            Some(RequestsLoggingLevel::Body)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only_uses_defaults() {
        let config = AppConfig::resolve(&cli_with_credentials(), None).unwrap();

        assert_eq!(config.port, 3001);
        assert_eq!(config.max_image_bytes, 10 * 1024 * 1024);
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.captioning.models.len(), 3);
        assert_eq!(config.catalog.min_popularity, 35);
        assert_eq!(config.catalog.market, "US");
        assert_eq!(config.recommendations.limit, 8);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            port: 3001,
            logging_level: RequestsLoggingLevel::Path,
            ..cli_with_credentials()
        };

        let file_config = FileConfig {
            port: Some(4000),
            logging_level: Some("body".to_string()),
            catalog: Some(CatalogConfig {
                min_popularity: Some(50),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.catalog.min_popularity, 50);
        // CLI credentials used when TOML doesn't specify
        assert_eq!(config.catalog.client_id, "id");
    }

    #[test]
    fn test_resolve_missing_catalog_credentials_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("client_id must be specified"));
    }

    #[test]
    fn test_resolve_rejects_zero_limit() {
        let file_config = FileConfig {
            recommendations: Some(RecommendationsConfig {
                limit: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_credentials(), Some(file_config));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be positive"));
    }

    #[test]
    fn test_resolve_rejects_too_many_captioning_models() {
        let file_config = FileConfig {
            captioning: Some(CaptioningConfig {
                models: Some(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_credentials(), Some(file_config));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at most"));
    }

    #[test]
    fn test_resolve_rejects_empty_captioning_models() {
        let file_config = FileConfig {
            captioning: Some(CaptioningConfig {
                models: Some(vec![]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_credentials(), Some(file_config)).is_err());
    }
}
