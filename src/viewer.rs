use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::formats::MatchScore;

const INDEX_HTML: &str = include_str!("../web/index.html");

#[derive(Debug, Clone)]
pub struct ViewerState {
    recommendations_path: Arc<PathBuf>,
}

impl ViewerState {
    pub fn new(recommendations_path: impl Into<PathBuf>) -> Self {
        Self {
            recommendations_path: Arc::new(recommendations_path.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("recommendations file not found: {0}")]
    NotFound(String),

    #[error("{0:#}")]
    Unreadable(anyhow::Error),

    #[error("cannot sort recommendations: {0:#}")]
    InvalidScore(anyhow::Error),
}

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ViewerError::NotFound(_) => StatusCode::NOT_FOUND,
            ViewerError::Unreadable(_) | ViewerError::InvalidScore(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = self.to_string();
        tracing::error!(status = status.as_u16(), error = %message, "GET /api/jobs failed");
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: ViewerState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/jobs", get(list_jobs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ViewerState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {addr}: {err}"))?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn list_jobs(
    State(state): State<ViewerState>,
) -> Result<Json<Vec<serde_json::Value>>, ViewerError> {
    let path = state.recommendations_path.as_ref();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ViewerError::NotFound(path.display().to_string()));
        }
        Err(err) => {
            return Err(ViewerError::Unreadable(
                anyhow::Error::new(err).context(format!("read: {}", path.display())),
            ));
        }
    };

    let records: Vec<serde_json::Value> = serde_json::from_slice(&bytes).map_err(|err| {
        ViewerError::Unreadable(
            anyhow::Error::new(err).context(format!("parse: {}", path.display())),
        )
    })?;

    let sorted = sort_by_match_score(records).map_err(ViewerError::InvalidScore)?;
    Ok(Json(sorted))
}

pub fn sort_by_match_score(
    records: Vec<serde_json::Value>,
) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut keyed = records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            let score = record_score(&record)
                .with_context(|| format!("record {idx} (job_id {})", record_job_id(&record)))?;
            Ok((score, record))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    keyed.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}

fn record_score(record: &serde_json::Value) -> anyhow::Result<f64> {
    let raw = record
        .get("match_score")
        .ok_or_else(|| anyhow::anyhow!("match_score is missing"))?;
    let score = serde_json::from_value::<MatchScore>(raw.clone())
        .map_err(|_| anyhow::anyhow!("match_score is not numeric: {raw}"))?;
    score.value()
}

fn record_job_id(record: &serde_json::Value) -> String {
    match record.get("job_id") {
        Some(serde_json::Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => "?".to_owned(),
    }
}
