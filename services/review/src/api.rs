use crate::config::{start_of_day, ApiConfig};
use crate::decisions::DecisionPayload;
use crate::error::ReviewError;
use crate::session::{ImageView, ReviewEngine};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReviewEngine>,
}

/// Data for the session setup page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetupResponse {
    /// Category names, all-categories sentinel first
    pub dropdown_options: Vec<String>,
    /// Creation date of the last image served
    pub current_date: NaiveDate,
}

/// Session setup form
#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    /// Start date as `YYYY-MM-DD`
    pub selected_date: Option<String>,
    /// Category name
    pub selected_option: Option<String>,
}

/// Label button for the rejection dialog
#[derive(Debug, Serialize, PartialEq)]
pub struct LabelButton {
    pub id: i32,
    pub text: String,
    pub parent: Option<i32>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: ReviewError) -> ApiError {
    let status = match &e {
        ReviewError::InvalidFilterCriteria(_) | ReviewError::MalformedDecisionPayload(_) => {
            StatusCode::BAD_REQUEST
        }
        ReviewError::DatastoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ReviewError::AssetResolutionFailed(_) => StatusCode::NOT_FOUND,
        ReviewError::SessionExhausted => StatusCode::NO_CONTENT,
    };

    if e.is_client_error() {
        info!(error = %e, "Rejected request");
    } else {
        error!(error = %e, "Request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/", get(session_setup))
        .route("/submit", post(submit))
        .route("/img", get(next_image))
        .route("/swipe", post(swipe))
        .route("/select/:parent", get(select))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "review-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Category options and the date to resume from
async fn session_setup(
    State(state): State<AppState>,
) -> Result<Json<SessionSetupResponse>, ApiError> {
    let dropdown_options = state
        .engine
        .category_options()
        .await
        .map_err(error_response)?;
    let snapshot = state.engine.snapshot().await;

    Ok(Json(SessionSetupResponse {
        dropdown_options,
        current_date: snapshot.current_date.date_naive(),
    }))
}

/// Start a new review session
#[instrument(skip(state))]
async fn submit(
    State(state): State<AppState>,
    Form(form): Form<SubmitForm>,
) -> Result<String, ApiError> {
    let date = form
        .selected_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            error_response(ReviewError::InvalidFilterCriteria(format!(
                "selected_date must be YYYY-MM-DD, got {:?}",
                form.selected_date
            )))
        })?;
    let category = form.selected_option.as_deref().ok_or_else(|| {
        error_response(ReviewError::InvalidFilterCriteria(
            "missing selected_option".to_string(),
        ))
    })?;

    let snapshot = state
        .engine
        .configure_session(start_of_day(date), category)
        .await
        .map_err(error_response)?;

    Ok(format!(
        "Selected Date: {}, Selected Option: {}",
        snapshot.start_date.format("%Y-%m-%d %H:%M:%S"),
        snapshot.category
    ))
}

/// Next image of the session
async fn next_image(State(state): State<AppState>) -> Result<Json<ImageView>, ApiError> {
    let view = state.engine.next_image().await.map_err(error_response)?;
    Ok(Json(view))
}

/// Record an accept (`right`) or reject (any other direction) decision
#[instrument(skip(state))]
async fn swipe(
    State(state): State<AppState>,
    payload: Result<Json<DecisionPayload>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        error_response(ReviewError::MalformedDecisionPayload(rejection.body_text()))
    })?;

    state
        .engine
        .record_decision(payload)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Label buttons under a parent label; parent `0` lists the root labels
async fn select(
    State(state): State<AppState>,
    Path(parent): Path<i32>,
) -> Result<Json<Vec<LabelButton>>, ApiError> {
    info!(parent = parent, "Label buttons requested");

    let parent = (parent != 0).then_some(parent);
    let buttons = state
        .engine
        .list_labels(parent)
        .await
        .map_err(error_response)?
        .into_iter()
        .map(|l| LabelButton {
            id: l.id,
            text: l.name,
            parent: l.parent,
        })
        .collect();

    Ok(Json(buttons))
}

/// Start the review API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting review API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

/// Wait for `shutdown`, aborting the server task once it resolves
///
/// A server task that ends first, for example because the listener could not
/// bind, is reported as an error.
pub async fn supervise_api_server<F>(mut server: JoinHandle<Result<()>>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => {
            info!("Shutting down review API server");
            server.abort();
            Ok(())
        }
        result = &mut server => match result {
            Ok(Ok(())) => anyhow::bail!("API server exited unexpectedly"),
            Ok(Err(e)) => Err(e.context("API server stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("API server task failed")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewConfig;
    use crate::models::ImageStatus;
    use crate::presigned_urls::{AssetUrlIssuer, MockUrlSigner};
    use crate::testing::MemoryStore;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};

    fn state_with(store: Arc<MemoryStore>) -> AppState {
        let mut signer = MockUrlSigner::new();
        signer
            .expect_presign_read()
            .returning(|_, _, _| Ok("https://signed.test/img".to_string()));
        let issuer = AssetUrlIssuer::new(Arc::new(signer), None, 5);

        AppState {
            engine: Arc::new(ReviewEngine::new(store, issuer, ReviewConfig::default())),
        }
    }

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::with_daily_images(3);
        store.add_label(3, "Termék", None);
        store.add_label(7, "Dog", Some(3));
        store.add_label(9, "Blurry", None);
        Arc::new(store)
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                ReviewError::InvalidFilterCriteria("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ReviewError::MalformedDecisionPayload("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ReviewError::DatastoreUnavailable(sqlx::Error::PoolTimedOut),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ReviewError::AssetResolutionFailed("s3://bucket/".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (ReviewError::SessionExhausted, StatusCode::NO_CONTENT),
        ];

        for (err, expected) in cases {
            let code = err.code();
            let (status, Json(body)) = error_response(err);
            assert_eq!(status, expected);
            assert_eq!(body.code, code);
        }
    }

    #[tokio::test]
    async fn test_submit_configures_session() {
        let state = state_with(store());
        let form = SubmitForm {
            selected_date: Some("2024-01-02".to_string()),
            selected_option: Some("Mind".to_string()),
        };

        let body = submit(State(state.clone()), Form(form)).await.unwrap();
        assert_eq!(body, "Selected Date: 2024-01-02 00:00:00, Selected Option: Mind");

        let Json(view) = next_image(State(state)).await.unwrap();
        assert_eq!(serde_json::to_value(&view.image_id).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_date() {
        let state = state_with(store());
        let form = SubmitForm {
            selected_date: Some("01/02/2024".to_string()),
            selected_option: Some("Mind".to_string()),
        };

        let (status, Json(body)) = submit(State(state), Form(form)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_FILTER");
    }

    async fn swipe_json(state: AppState, body: &str) -> Result<Json<serde_json::Value>, ApiError> {
        let request = Request::builder()
            .method("POST")
            .uri("/swipe")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let payload = Json::<DecisionPayload>::from_request(request, &()).await;

        swipe(State(state), payload).await
    }

    #[tokio::test]
    async fn test_swipe_rejects_malformed_payload() {
        let state = state_with(store());

        for body in [
            r#"{"direction": "right"}"#,
            r#"{"direction": 5, "imageId": 3}"#,
            r#"{"direction": "left", "imageId": 3, "labels": [{"id": "7", "value": 1}]}"#,
            r#"{"direction": "left", "imageId": 3, "labels": "Dog"}"#,
            r#"[1, 2]"#,
            r#"{"direction": "left""#,
        ] {
            let (status, Json(error)) = swipe_json(state.clone(), body).await.unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
            assert_eq!(error.code, "MALFORMED_DECISION", "body {body}");
        }
    }

    #[tokio::test]
    async fn test_swipe_records_decisions() {
        let store = store();
        let state = state_with(store.clone());

        let Json(body) = swipe_json(state.clone(), r#"{"direction": "right", "imageId": 2}"#)
            .await
            .unwrap();
        assert_eq!(body, serde_json::json!({ "success": true }));
        assert_eq!(store.status_of(2), Some(ImageStatus::Accepted));

        swipe_json(state, r#"{"direction": "down", "imageId": 3}"#)
            .await
            .unwrap();
        assert_eq!(store.status_of(3), Some(ImageStatus::Rejected));
    }

    #[tokio::test]
    async fn test_supervisor_fails_when_server_cannot_start() {
        let server = tokio::spawn(async {
            Err::<(), _>(anyhow::anyhow!("Failed to bind to address"))
        });

        let result = supervise_api_server(server, std::future::pending::<()>()).await;

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to bind to address"));
    }

    #[tokio::test]
    async fn test_supervisor_stops_server_on_shutdown() {
        let server = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok::<(), anyhow::Error>(())
        });

        assert!(supervise_api_server(server, async {}).await.is_ok());
    }

    #[tokio::test]
    async fn test_select_lists_children_or_roots() {
        let state = state_with(store());

        let Json(children) = select(State(state.clone()), Path(3)).await.unwrap();
        assert_eq!(
            children,
            vec![LabelButton {
                id: 7,
                text: "Dog".to_string(),
                parent: Some(3)
            }]
        );

        let Json(roots) = select(State(state), Path(0)).await.unwrap();
        let ids: Vec<i32> = roots.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[tokio::test]
    async fn test_session_setup_lists_categories() {
        let state = state_with(store());

        let Json(setup) = session_setup(State(state)).await.unwrap();
        assert_eq!(setup.dropdown_options, vec!["Mind", "Dog"]);
        assert_eq!(setup.current_date.to_string(), "2024-01-01");
    }
}
