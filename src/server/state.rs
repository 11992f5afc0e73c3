use axum::extract::FromRef;

use crate::recommend::AnalysisService;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedAnalysisService = Arc<AnalysisService>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub service: GuardedAnalysisService,
}

impl FromRef<ServerState> for GuardedAnalysisService {
    fn from_ref(input: &ServerState) -> Self {
        input.service.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
