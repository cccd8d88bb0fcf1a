// src/server/mod.rs

//! The HTTP frontend: an axum router that funnels page requests through
//! the orchestrator and exposes the admin surface.
//!
//! Page callbacks are matched to request paths through their registry
//! metadata: a callback registered with a `route` glob (e.g. `/blog/*`)
//! serves every matching path. Background jobs are drained by a worker
//! task that runs independently of request handlers, so a response is
//! always handed to the network layer before its regeneration job runs.

use crate::core::classifier::RequestView;
use crate::core::dispatch::{Dispatcher, JobExecutor, JobWorker};
use crate::core::generator::CallbackParams;
use crate::core::invalidation::{InvalidationEvent, InvalidationResolver, Purger, PurgeSelector};
use crate::core::orchestrator::{CallbackSource, Orchestrator, RenderOptions};
use crate::core::response::ResponseEnvelope;
use crate::core::state::AppState;
use crate::core::tasks::{LockCleanerTask, StorePrunerTask};
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use wildmatch::WildMatch;

/// Shared state handed to every axum handler.
#[derive(Clone)]
struct HttpState {
    app: Arc<AppState>,
    orchestrator: Arc<Orchestrator>,
    purger: Arc<Purger>,
    resolver: Arc<InvalidationResolver>,
}

/// Starts the worker, the janitors, and the HTTP listener, then serves
/// until SIGINT/SIGTERM.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let (job_tx, job_rx) = mpsc::channel(state.config.background.queue_depth);
    let executor = Arc::new(JobExecutor::new(state.clone()));
    let dispatcher = Arc::new(Dispatcher::standard(job_tx, executor.clone()));
    let orchestrator = Arc::new(Orchestrator::new(state.clone(), dispatcher));

    tokio::spawn(JobWorker::new(job_rx, executor).run(shutdown_tx.subscribe()));
    tokio::spawn(LockCleanerTask::new(state.clone()).run(shutdown_tx.subscribe()));
    tokio::spawn(StorePrunerTask::new(state.clone()).run(shutdown_tx.subscribe()));

    let http_state = HttpState {
        purger: Arc::new(Purger::new(state.store.clone())),
        resolver: Arc::new(InvalidationResolver::default()),
        app: state.clone(),
        orchestrator,
    };
    let app = router(http_state);

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Restatic listening on {addr}.");

    axum::serve(listener, app)
        .with_graceful_shutdown(await_shutdown_signal())
        .await?;

    // Stop the worker and janitors once the listener has drained.
    let _ = shutdown_tx.send(());
    info!("Server shutdown complete.");
    Ok(())
}

/// Waits for a shutdown signal based on the operating system.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, initiating graceful shutdown.");
    }
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/_isr/stats", get(stats_handler))
        .route("/_isr/invalidate", post(invalidate_handler))
        .route("/_isr/purge", post(purge_handler))
        .fallback(page_handler)
        .with_state(state)
}

/// Serves a page through the ISR pipeline.
async fn page_handler(State(state): State<HttpState>, request: Request) -> Response {
    let view = request_view(&request);
    let path = view.path.clone();

    let Some((callback_name, metadata)) = resolve_route(&state, &path) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            "no page is registered for this path",
        )
            .into_response();
    };

    let url = if view.query.is_empty() {
        path.clone()
    } else {
        let query = request.uri().query().unwrap_or_default();
        format!("{path}?{query}")
    };

    let mut callback_params = CallbackParams::new();
    callback_params.insert("url".to_string(), Value::from(url.as_str()));
    for (name, value) in &view.query {
        callback_params.insert(name.clone(), Value::from(value.as_str()));
    }

    let options = RenderOptions {
        variants: variants_for_request(&state.app.config.cache.variant_axes, &view),
        ttl: metadata.get("ttl").and_then(Value::as_u64),
        callback_params,
        ..Default::default()
    };

    let envelope = state
        .orchestrator
        .handle(&view, &url, CallbackSource::Named(callback_name), options)
        .await;
    into_axum_response(envelope)
}

/// Reports engine and store statistics.
async fn stats_handler(State(state): State<HttpState>) -> Json<Value> {
    let store = state.app.store.stats().await;
    Json(json!({
        "stats": state.app.stats.snapshot(),
        "store": store,
    }))
}

/// Applies a domain invalidation event.
async fn invalidate_handler(
    State(state): State<HttpState>,
    Json(event): Json<InvalidationEvent>,
) -> Json<Value> {
    let report = state.purger.purge_event(&state.resolver, &event).await;
    state.app.stats.record_purged(report.purged_count);
    Json(serde_json::to_value(&report).unwrap_or_default())
}

/// Purges by explicit keys, URL pattern, or wholesale.
async fn purge_handler(
    State(state): State<HttpState>,
    Json(selector): Json<PurgeSelector>,
) -> Json<Value> {
    let report = state.purger.purge(&selector).await;
    state.app.stats.record_purged(report.purged_count);
    Json(serde_json::to_value(&report).unwrap_or_default())
}

/// Finds the registered callback whose `route` metadata glob matches the
/// path. The longest matching pattern wins, so `/blog/*` outranks `/*`.
fn resolve_route(state: &HttpState, path: &str) -> Option<(String, HashMap<String, Value>)> {
    let mut best: Option<(usize, String, HashMap<String, Value>)> = None;
    for name in state.app.registry.list() {
        let Some(metadata) = state.app.registry.metadata(&name) else {
            continue;
        };
        let Some(route) = metadata.get("route").and_then(Value::as_str) else {
            continue;
        };
        if WildMatch::new(route).matches(path)
            && best.as_ref().is_none_or(|(len, _, _)| route.len() > *len)
        {
            best = Some((route.len(), name, metadata.clone()));
        }
    }
    best.map(|(_, name, metadata)| (name, metadata))
}

/// Projects an axum request into the classifier's view: lowercased
/// header and cookie names, split query pairs.
fn request_view(request: &Request) -> RequestView {
    let mut headers = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let cookies = headers
        .get("cookie")
        .map(|raw| {
            raw.split(';')
                .filter_map(|pair| {
                    let (name, value) = pair.split_once('=')?;
                    Some((name.trim().to_string(), value.trim().to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let query = request
        .uri()
        .query()
        .map(|raw| {
            raw.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((name, value)) => (name.to_string(), value.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();

    RequestView {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        headers,
        cookies,
        query,
    }
}

/// Derives the enabled variant axes from the request. Absent signals
/// simply omit the axis.
fn variants_for_request(
    axes: &[String],
    view: &RequestView,
) -> crate::core::keys::VariantMap {
    let mut variants = crate::core::keys::VariantMap::new();
    for axis in axes {
        match axis.as_str() {
            "device" => {
                let mobile = view
                    .headers
                    .get("user-agent")
                    .is_some_and(|ua| ua.to_ascii_lowercase().contains("mobile"));
                variants.insert(
                    "device".to_string(),
                    if mobile { "mobile" } else { "desktop" }.to_string(),
                );
            }
            "language" => {
                if let Some(lang) = view.headers.get("accept-language") {
                    let primary = lang
                        .split(',')
                        .next()
                        .unwrap_or("")
                        .split(['-', ';'])
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_ascii_lowercase();
                    if !primary.is_empty() {
                        variants.insert("language".to_string(), primary);
                    }
                }
            }
            other => warn!("Ignoring unknown variant axis '{other}'."),
        }
    }
    variants
}

/// Converts a prepared envelope into an axum response. `Content-Length`
/// is left to the transport, which computes it from the same bytes.
fn into_axum_response(envelope: ResponseEnvelope) -> Response {
    let mut builder = Response::builder().status(envelope.status);
    for (name, value) in &envelope.headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(envelope.body))
        .unwrap_or_else(|e| {
            warn!("Failed to materialize response: {e}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
