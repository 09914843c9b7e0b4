//! Application state.

use std::sync::Arc;
use std::time::Duration;

use reel_media::ProcessRunner;
use reel_pipeline::{Composer, PipelineConfig};
use reel_storage::R2Client;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub composer: Arc<Composer>,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let pipeline = PipelineConfig::from_env();
        let storage = R2Client::from_env().await?;

        let runner = match pipeline.stage_timeout_secs {
            Some(secs) => ProcessRunner::new().with_timeout(secs),
            None => ProcessRunner::new(),
        };

        let composer = Composer::new(pipeline, Arc::new(runner), Arc::new(storage))?;
        Ok(Self::from_parts(config, composer))
    }

    pub fn from_parts(config: ApiConfig, composer: Composer) -> Self {
        Self {
            config,
            composer: Arc::new(composer),
        }
    }

    /// Upper bound used by the readiness probe for the store check.
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}
