//! HTTP surface: axum router over the application services.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

/// Build the service router.
///
/// `cors_origin` of `None` allows any origin. `timeout` bounds the read-only
/// routes; `/predict` and `/admin/model/reload` commit state from a blocking
/// task and always run to completion, so a client never sees a 408 for a
/// prediction that was recorded.
pub fn router(state: Arc<AppState>, cors_origin: Option<HeaderValue>, timeout: Duration) -> Router {
    let origin = match cors_origin {
        Some(origin) => AllowOrigin::exact(origin),
        None => AllowOrigin::from(Any),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    // Layers only wrap routes registered before them.
    Router::new()
        .route("/auth/jwt/login", post(routes::login))
        .route("/analytics/summary", get(routes::summary))
        .route("/analytics/breakdown/{dimension}", get(routes::breakdown))
        .route("/predictions", get(routes::predictions))
        .route("/admin/model", get(routes::model_info))
        .route("/health", get(routes::health))
        .layer(TimeoutLayer::new(timeout))
        .route("/predict", post(routes::predict))
        .route("/admin/model/reload", post(routes::reload_model))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` until Ctrl-C or SIGTERM.
///
/// # Errors
/// Returns error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Server running on {addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::model::{manifest, tests::exported, ModelLoader};
    use crate::adapters::sqlite::SqliteStorage;
    use crate::domain::features::tests::sample_body;
    use crate::domain::{Role, TokenKey};
    use axum::{
        body::{to_bytes, Body},
        http::{header::WWW_AUTHENTICATE, Request, StatusCode},
    };
    use ed25519_dalek::SigningKey;
    use serde_json::{json, Value};
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: Arc<AppState>,
        dir: TempDir,
        signing_key: SigningKey,
    }

    fn sign_model(dir: &Path, key: &SigningKey, version: &str, serial: u64) {
        let json = serde_json::to_string(&exported(version, 0.5)).expect("serialize model");
        std::fs::write(dir.join(manifest::MODEL_FILE), json).expect("write model");
        manifest::Manifest::for_files(
            dir,
            &[manifest::MODEL_FILE],
            serial,
            chrono::Utc::now().timestamp(),
        )
        .expect("manifest")
        .write_signed(dir, key)
        .expect("sign");
    }

    fn harness() -> Harness {
        let dir = tempdir().expect("tempdir");
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        sign_model(dir.path(), &signing_key, "http-v1", 1);

        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let loader = ModelLoader::new(dir.path(), Some(signing_key.verifying_key()), false);
        let state = AppState::new(storage, TokenKey::generate(), 3600, loader);
        state
            .auth
            .register("admin", "admin-pass", Role::Admin)
            .expect("Should register admin");
        state
            .auth
            .register("farmer", "farmer-pass", Role::Farmer)
            .expect("Should register farmer");

        Harness {
            app: router(state.clone(), None, Duration::from_secs(10)),
            state,
            dir,
            signing_key,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<HeaderValue>, Value) {
        let response = app.clone().oneshot(request).await.expect("Should respond");
        let status = response.status();
        let challenge = response.headers().get(WWW_AUTHENTICATE).cloned();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("JSON body")
        };
        (status, challenge, body)
    }

    fn login_request(form: &str) -> Request<Body> {
        Request::post("/auth/jwt/login")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .expect("request")
    }

    async fn token(app: &Router, username: &str, password: &str) -> String {
        let form = format!("username={username}&password={password}");
        let (status, _, body) = send(app, login_request(&form)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().expect("token").to_string()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, token: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let h = harness();
        let (status, _, body) = send(&h.app, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "model_loaded": false}));

        h.state.reload_model().expect("Should load model");
        let (_, _, body) = send(&h.app, get("/health", None)).await;
        assert_eq!(body["model_loaded"], true);
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let h = harness();
        let (status, challenge, body) =
            send(&h.app, login_request("username=admin&password=wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(challenge, Some(HeaderValue::from_static("Bearer")));
        assert_eq!(body["detail"], "Invalid username or password");

        let (status, _, _) = send(&h.app, login_request("username=nobody&password=x")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = send(&h.app, login_request("username=admin")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_predict_requires_bearer() {
        let h = harness();
        let request = Request::post("/predict")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(sample_body().to_string()))
            .expect("request");
        let (status, challenge, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(challenge.is_some());

        let body = sample_body().to_string();
        let (status, _, _) = send(&h.app, post_json("/predict", "not.a.token", &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_predict_flow_updates_summary() {
        let h = harness();
        let farmer = token(&h.app, "farmer", "farmer-pass").await;
        let body = sample_body().to_string();

        let (status, _, _) = send(&h.app, post_json("/predict", &farmer, &body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        h.state.reload_model().expect("Should load model");
        let (status, _, outcome) = send(&h.app, post_json("/predict", &farmer, &body)).await;
        assert_eq!(status, StatusCode::OK);
        let probability = outcome["probability"].as_f64().expect("probability");
        assert!((0.0..=1.0).contains(&probability));
        assert_eq!(outcome["creditworthy"], probability >= 0.5);
        assert!(outcome["evaluation_id"].is_string());
        assert!(outcome["advice"].is_array());

        let (status, _, summary) = send(&h.app, get("/analytics/summary", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["total"], 1);
        assert_eq!(
            summary["creditworthy"].as_u64().expect("count")
                + summary["not_creditworthy"].as_u64().expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn test_predict_rejects_bad_payloads() {
        let h = harness();
        h.state.reload_model().expect("Should load model");
        let farmer = token(&h.app, "farmer", "farmer-pass").await;

        let mut negative_age = sample_body();
        negative_age["age"] = json!(-1);
        let (status, _, body) =
            send(&h.app, post_json("/predict", &farmer, &negative_age.to_string())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "age");
        assert_eq!(body["reason"], "negative");

        let (status, _, _) = send(&h.app, post_json("/predict", &farmer, "{\"age\": ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, _, summary) = send(&h.app, get("/analytics/summary", None)).await;
        assert_eq!(summary["total"], 0);
    }

    #[tokio::test]
    async fn test_role_permissions() {
        let h = harness();
        let farmer = token(&h.app, "farmer", "farmer-pass").await;
        let admin = token(&h.app, "admin", "admin-pass").await;

        let (status, challenge, _) =
            send(&h.app, get("/analytics/breakdown/gender", Some(&farmer))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(challenge.is_none());

        let (status, _, _) = send(&h.app, post_json("/admin/model/reload", &farmer, "")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(&h.app, get("/admin/model", Some(&admin))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _, info) = send(&h.app, post_json("/admin/model/reload", &admin, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["version"], "http-v1");
        assert_eq!(info["serial"], 1);

        let (status, _, info) = send(&h.app, get("/admin/model", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["features"].as_array().map(Vec::len), Some(11));
    }

    #[tokio::test]
    async fn test_reload_refuses_rollback() {
        let h = harness();
        let admin = token(&h.app, "admin", "admin-pass").await;
        let (status, _, _) = send(&h.app, post_json("/admin/model/reload", &admin, "")).await;
        assert_eq!(status, StatusCode::OK);

        sign_model(h.dir.path(), &h.signing_key, "http-v0", 0);
        let (status, _, _) = send(&h.app, post_json("/admin/model/reload", &admin, "")).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, _, info) = send(&h.app, get("/admin/model", Some(&admin))).await;
        assert_eq!(info["version"], "http-v1");
    }

    #[tokio::test]
    async fn test_predict_is_not_cut_short_by_timeout() {
        let h = harness();
        h.state.reload_model().expect("Should load model");
        let farmer = h
            .state
            .auth
            .login("farmer", "farmer-pass")
            .expect("Should login")
            .access_token;
        let app = router(h.state.clone(), None, Duration::ZERO);

        let body = sample_body().to_string();
        for _ in 0..3 {
            let (status, _, _) = send(&app, post_json("/predict", &farmer, &body)).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(h.state.analytics.summarize().expect("Should summarize").total, 3);
    }

    #[tokio::test]
    async fn test_breakdown_and_listing() {
        let h = harness();
        h.state.reload_model().expect("Should load model");
        let admin = token(&h.app, "admin", "admin-pass").await;
        let body = sample_body().to_string();
        for _ in 0..3 {
            let (status, _, _) = send(&h.app, post_json("/predict", &admin, &body)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _, rows) = send(&h.app, get("/analytics/breakdown/gender", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        let rows = rows.as_array().expect("rows");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["category"], "male");
        assert_eq!(rows[0]["summary"]["total"], 3);
        assert_eq!(rows[1]["summary"]["total"], 0);

        let (status, _, _) = send(&h.app, get("/analytics/breakdown/shoe_size", Some(&admin))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, page) =
            send(&h.app, get("/predictions?offset=0&limit=2", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_count"], 3);
        assert_eq!(page["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(page["has_more"], true);

        let uri = format!("/predictions?offset={}&limit=2", usize::MAX);
        let (status, _, page) = send(&h.app, get(&uri, Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["items"].as_array().map(Vec::len), Some(0));
        assert_eq!(page["has_more"], false);
    }
}
