use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, Path, Query, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task;

use super::{error::ApiError, extract::Bearer, state::AppState};
use crate::application::PredictionOutcome;
use crate::domain::{self, AccessToken, BreakdownRow, Dimension, Permission, Summary};
use crate::ports::{EvaluationPage, ModelInfo};

const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<AccessToken>, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let token =
        task::spawn_blocking(move || state.auth.login(&form.username, &form.password)).await??;
    Ok(Json(token))
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Bearer(claims): Bearer,
    body: Bytes,
) -> Result<Json<PredictionOutcome>, ApiError> {
    claims.require(Permission::Predict)?;

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed JSON body: {e}")))?;
    let payload = domain::validate(&raw).map_err(ApiError::Validation)?;

    tracing::debug!("Prediction requested by {}", claims.sub);
    let outcome = task::spawn_blocking(move || state.engine.predict(payload)).await??;
    Ok(Json(outcome))
}

pub async fn summary(State(state): State<Arc<AppState>>) -> Result<Json<Summary>, ApiError> {
    let summary = task::spawn_blocking(move || state.analytics.summarize()).await??;
    Ok(Json(summary))
}

pub async fn breakdown(
    State(state): State<Arc<AppState>>,
    Bearer(claims): Bearer,
    Path(dimension): Path<String>,
) -> Result<Json<Vec<BreakdownRow>>, ApiError> {
    claims.require(Permission::ViewAnalytics)?;
    let dimension: Dimension = dimension
        .parse()
        .map_err(|e: domain::UnknownDimension| ApiError::NotFound(e.to_string()))?;

    let rows = task::spawn_blocking(move || state.analytics.breakdown(dimension)).await??;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

pub async fn predictions(
    State(state): State<Arc<AppState>>,
    Bearer(claims): Bearer,
    Query(query): Query<PageQuery>,
) -> Result<Json<EvaluationPage>, ApiError> {
    claims.require(Permission::ViewEvaluations)?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let page = task::spawn_blocking(move || state.analytics.recent(query.offset, limit)).await??;
    Ok(Json(page))
}

pub async fn model_info(
    State(state): State<Arc<AppState>>,
    Bearer(claims): Bearer,
) -> Result<Json<ModelInfo>, ApiError> {
    claims.require(Permission::ManageModel)?;
    Ok(Json(state.engine.model_info()?))
}

pub async fn reload_model(
    State(state): State<Arc<AppState>>,
    Bearer(claims): Bearer,
) -> Result<Json<ModelInfo>, ApiError> {
    claims.require(Permission::ManageModel)?;
    tracing::info!("Model reload requested by {}", claims.sub);

    let info = task::spawn_blocking(move || state.reload_model()).await??;
    Ok(Json(info))
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    model_loaded: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        model_loaded: state.engine.is_loaded(),
    })
}
