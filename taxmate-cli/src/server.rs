//! HTTP front end: one route that streams analysis events as NDJSON.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use taxmate_core::PipelineEvent;
use taxmate_statement::error::MSG_FETCH_FAILED;
use taxmate_statement::{BlobStore, DocumentStore, GeminiClient, Prefetched, StatementAnalyser};

use crate::config::{self, Config};

const NDJSON: &str = "application/x-ndjson";
/// Total of the keep-alive record sent before the page count is known.
const INITIAL_TOTAL: usize = 100;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyseRequest {
    #[serde(default)]
    blob_url: Option<String>,
}

pub async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;

    if config::api_key().is_none() {
        tracing::warn!(env = config::API_KEY_ENV, "API key not set; analysis requests will fail");
    }

    let app = router(AppState {
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "statement analyser listening");
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/statement-analyser", post(analyse_handler))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn analyse_handler(State(state): State<AppState>, body: Option<Json<AnalyseRequest>>) -> Response {
    let Some(blob_url) = body
        .and_then(|Json(req)| req.blob_url)
        .filter(|u| !u.trim().is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "No file URL provided");
    };

    let cfg = &state.config;
    let store = match BlobStore::new(config::store_token(), cfg.staging.delete_endpoint.clone()) {
        Ok(store) => store.with_max_bytes(cfg.server.max_upload_bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to build object store client");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error");
        }
    };

    let Some(api_key) = config::api_key() else {
        tracing::error!(env = config::API_KEY_ENV, "API key not configured");
        if let Err(e) = store.release(&blob_url).await {
            tracing::error!(error = %e, "failed to release staged document");
        }
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error: AI service key is not set",
        );
    };

    let client = match GeminiClient::new(cfg.gemini_config(api_key)) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to build provider client");
            if let Err(e) = store.release(&blob_url).await {
                tracing::error!(error = %e, "failed to release staged document");
            }
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error");
        }
    };

    // Fetch before streaming so an unreachable blob is a plain 500.
    let store = match stage(store, &blob_url).await {
        Ok(store) => store,
        Err(resp) => return resp,
    };

    let analyser = StatementAnalyser::new(client, store, cfg.analyser_settings());
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(PipelineEvent::progress(0, INITIAL_TOTAL));

    tokio::spawn(async move {
        analyser.analyse_into(&blob_url, tx).await;
    });

    ndjson_response(rx)
}

async fn stage<S: DocumentStore>(store: S, blob_url: &str) -> Result<Prefetched<S>, Response> {
    match Prefetched::fetch_from(store, blob_url).await {
        Ok(staged) => Ok(staged),
        Err((store, e)) => {
            tracing::error!(error = %e, "failed to fetch staged document");
            if let Err(e) = store.release(blob_url).await {
                tracing::error!(error = %e, "failed to release staged document");
            }
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_FETCH_FAILED))
        }
    }
}

/// Stream events to the client until the sender is dropped.
fn ndjson_response(rx: mpsc::UnboundedReceiver<PipelineEvent>) -> Response {
    let lines = stream::unfold(rx, |mut rx| async move {
        loop {
            let event = rx.recv().await?;
            match event.to_ndjson() {
                Ok(line) => return Some((Ok::<_, Infallible>(line), rx)),
                Err(e) => tracing::error!(error = %e, "failed to encode event"),
            }
        }
    });

    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
