//! Application state and service initialization
//!
//! This module centralizes service initialization and dependency injection,
//! making it easier to manage the application lifecycle and test services.

use std::sync::Arc;

use crate::model::Config;
use crate::service::{
    LlmClient, PipelineOrchestrator, PipelineSettings, ResultsWriter, SharedGenerator,
    TaxonomyBuilder,
};

/// Application state containing all services and shared resources
pub struct AppState {
    /// Pipeline runner shared by every handler
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl AppState {
    /// Initialize all services and build application state
    ///
    /// This performs:
    /// 1. API key pre-flight for the configured provider
    /// 2. Text-generation client initialization
    /// 3. Pipeline orchestrator construction
    pub fn new(config: Config) -> Result<Self, AppError> {
        let api_key = TaxonomyBuilder::preflight(&config.provider)
            .map_err(|e| AppError::MissingConfig(e.to_string()))?;

        let settings = PipelineSettings {
            max_concurrent_calls: config.max_concurrent_calls,
            default_run_name: config.provider.kind.default_run_name(),
            default_exp_group: config.exp_group.clone(),
        };
        let writer = ResultsWriter::new(&config.results_dir);

        let generator: SharedGenerator = Arc::new(LlmClient::new(
            config.provider,
            api_key,
            config.structured_outputs,
        ));

        let orchestrator = Arc::new(PipelineOrchestrator::new(generator, settings, Some(writer)));

        Ok(Self { orchestrator })
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_aborts_startup() {
        let mut config = Config::default();
        // A variable that is never set keeps the test independent of the environment
        config.provider.api_key_env = "T3C_TEST_UNSET_API_KEY";

        let result = AppState::new(config);
        assert!(matches!(result, Err(AppError::MissingConfig(msg)) if msg.contains("T3C_TEST_UNSET_API_KEY")));
    }
}
