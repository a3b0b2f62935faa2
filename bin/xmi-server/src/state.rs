//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use xmi_core::Pipeline;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Conversion pipeline; holds the sandbox root, the IR stage client and
    /// the cached model-tool location.
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let pipeline = Pipeline::new(config.pipeline_config())?;
        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        })
    }
}
