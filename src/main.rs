//! AgriCredit: creditworthiness prediction service
//!
//! Main entry point for the HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agricredit::adapters::model::ModelLoader;
use agricredit::adapters::sanitize::SanitizingMakeWriter;
use agricredit::adapters::sqlite::SqliteStorage;
use agricredit::config::Config;
use agricredit::http::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stdout by default so `docker logs` works.
    let use_file = std::env::var("AGRICREDIT_LOG_MODE").is_ok_and(|mode| mode == "file");

    let (writer, _guard) = if use_file {
        let log_file =
            std::env::var("AGRICREDIT_LOG_FILE").unwrap_or_else(|_| "agricredit.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort: the open below reports the real error.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    tracing::info!("Starting AgriCredit...");

    let Config {
        bind,
        db_path,
        model_path,
        token_ttl_secs,
        request_timeout,
        allow_unsigned_models,
        cors_origin,
        token_key,
        model_verifying_key,
    } = Config::from_env().context("Invalid configuration")?;

    let storage = Arc::new(
        SqliteStorage::new(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );
    let loader = ModelLoader::new(model_path, model_verifying_key, allow_unsigned_models);
    let state = AppState::new(storage, token_key, token_ttl_secs, loader);

    if let Err(e) = state.reload_model() {
        tracing::warn!(
            "No model loaded from {:?}: {e}. Predictions answer 503 until a reload succeeds.",
            state.loader.dir()
        );
    }

    let app = http::router(state, cors_origin, request_timeout);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    http::serve(listener, app).await?;

    tracing::info!("AgriCredit shutdown complete.");
    Ok(())
}
