use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use musicvision_server::config::{AppConfig, CliConfig, FileConfig};
use musicvision_server::recommend::{
    AnalysisService, CaptionWriter, PipelineSettings, Reasoner, RecommendationPipeline,
};
use musicvision_server::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use musicvision_server::{
    AnalysisStore, CatalogClient, Captioner, FallbackCaptioner, HfInferenceCaptioner,
    InMemoryAnalysisStore, LlmProvider, OpenAIProvider, SpotifyClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use musicvision_server::llm::CompletionOptions;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values there override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Bearer token for the captioning inference API.
    #[clap(long)]
    pub captioning_api_key: Option<String>,

    /// API key for the language model service.
    #[clap(long)]
    pub llm_api_key: Option<String>,

    /// Catalog API client id.
    #[clap(long)]
    pub catalog_client_id: Option<String>,

    /// Catalog API client secret.
    #[clap(long)]
    pub catalog_client_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        captioning_api_key: cli_args
            .captioning_api_key
            .or_else(|| std::env::var("HF_API_KEY").ok()),
        llm_api_key: cli_args
            .llm_api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        catalog_client_id: cli_args
            .catalog_client_id
            .or_else(|| std::env::var("SPOTIFY_CLIENT_ID").ok()),
        catalog_client_secret: cli_args
            .catalog_client_secret
            .or_else(|| std::env::var("SPOTIFY_CLIENT_SECRET").ok()),
    };

    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let chain: Vec<Box<dyn Captioner>> = config
        .captioning
        .models
        .iter()
        .map(|model| {
            Box::new(HfInferenceCaptioner::new(
                config.captioning.base_url.clone(),
                model.clone(),
                config.captioning.api_key.clone(),
                config.captioning.timeout,
            )) as Box<dyn Captioner>
        })
        .collect();
    let captioner = FallbackCaptioner::new(chain);
    info!(
        "Captioning chain: {}",
        config.captioning.models.join(" -> ")
    );

    let provider: Arc<dyn LlmProvider> = match &config.llm.api_key_command {
        Some(command) => Arc::new(OpenAIProvider::with_key_command(
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            command.clone(),
        )),
        None => Arc::new(OpenAIProvider::new(
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            config.llm.api_key.clone(),
        )),
    };
    info!("Reasoner model: {}", config.llm.model);

    let completion_options = CompletionOptions {
        temperature: config.llm.temperature,
        max_tokens: Some(config.llm.max_tokens),
        timeout: config.llm.timeout,
    };

    let catalog: Arc<dyn CatalogClient> = Arc::new(SpotifyClient::new(
        config.catalog.base_url.clone(),
        config.catalog.auth_url.clone(),
        config.catalog.client_id.clone(),
        config.catalog.client_secret.clone(),
        config.catalog.market.clone(),
        config.catalog.timeout,
    ));

    let pipeline = RecommendationPipeline::new(
        Reasoner::new(Arc::clone(&provider), completion_options.clone()),
        CaptionWriter::new(provider, completion_options),
        catalog,
        PipelineSettings {
            limit: config.recommendations.limit,
            max_keyword_queries: config.recommendations.max_keyword_queries,
            per_query_limit: config.recommendations.per_query_limit,
            min_popularity: config.catalog.min_popularity,
        },
    );

    let store: Arc<dyn AnalysisStore> = Arc::new(InMemoryAnalysisStore::new());

    // Spawn background task for analysis pruning if enabled
    if config.retention_hours > 0 {
        let retention_hours = config.retention_hours;
        let interval_minutes = config.prune_interval_minutes;
        let pruning_store = store.clone();

        info!(
            "Analysis pruning enabled: retaining {} hours, pruning every {} minutes",
            retention_hours, interval_minutes
        );

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_minutes * 60);
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let cutoff = Utc::now() - chrono::Duration::hours(retention_hours as i64);

                match pruning_store.prune_older_than(cutoff).await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Pruned {} expired analyses", count);
                        }
                        if let Ok(len) = pruning_store.len().await {
                            server::metrics::set_analyses_stored(len);
                        }
                    }
                    Err(e) => {
                        error!("Failed to prune analyses: {}", e);
                    }
                }
            }
        });
    }

    let service = Arc::new(AnalysisService::new(captioner, pipeline, store));

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level,
        port: config.port,
        max_image_bytes: config.max_image_bytes,
    };

    info!("Ready to serve at port {}!", server_config.port);
    tokio::select! {
        result = run_server(server_config, service) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
