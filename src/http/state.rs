//! Shared service state, built once at startup and handed to every handler.

use std::sync::Arc;

use crate::adapters::model::{LinearModel, ModelLoader};
use crate::adapters::sqlite::SqliteStorage;
use crate::application::{AnalyticsAggregator, AuthGateway, PredictionEngine};
use crate::domain::TokenKey;
use crate::ports::ModelInfo;
use crate::AgricreditError;

pub struct AppState {
    pub auth: AuthGateway<SqliteStorage>,
    pub engine: PredictionEngine<LinearModel, SqliteStorage>,
    pub analytics: AnalyticsAggregator<SqliteStorage>,
    pub loader: ModelLoader,
}

impl AppState {
    /// Wire the services over one storage handle. No model is installed yet.
    pub fn new(
        storage: Arc<SqliteStorage>,
        token_key: TokenKey,
        token_ttl_secs: i64,
        loader: ModelLoader,
    ) -> Arc<Self> {
        Arc::new(Self {
            auth: AuthGateway::new(storage.clone(), token_key, token_ttl_secs),
            engine: PredictionEngine::new(storage.clone()),
            analytics: AnalyticsAggregator::new(storage),
            loader,
        })
    }

    /// Load the model from the configured directory and hot-swap it in.
    ///
    /// On failure the current snapshot (if any) stays installed.
    ///
    /// # Errors
    /// Returns error if loading, verification or the rollback check fails.
    pub fn reload_model(&self) -> Result<ModelInfo, AgricreditError> {
        let model = self.loader.load()?;
        self.engine.install(model)
    }
}
