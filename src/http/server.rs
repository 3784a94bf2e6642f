//! HTTP API Server for Quarry
//!
//! Provides REST endpoints to submit, stop and inspect the query of one shared
//! session, and a WebSocket that pushes the session state whenever its status
//! or results change.

use crate::{
    api::query_session::{QuerySession, SessionError, SessionView},
    core::{RunState, Source, Submission},
    registry::source_catalog::{self, CatalogError, SourceCatalog},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use oxigraph::model::Term;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Request to run a query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunQueryRequest {
    pub query: String,
    /// Catalog shortnames.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Ad-hoc sources not in the catalog.
    #[serde(default)]
    pub custom_sources: Vec<Source>,
}

/// Response for the staleness check
#[derive(Debug, Serialize)]
pub struct StaleResponse {
    pub stale: bool,
}

/// Response for listing sources
#[derive(Debug, Serialize)]
pub struct ListSourcesResponse {
    pub sources: Vec<Source>,
    pub total: usize,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared application state
pub struct AppState {
    pub session: QuerySession,
    pub catalog: SourceCatalog,
}

/// Custom error type for API errors
pub enum ApiError {
    Session(SessionError),
    Catalog(CatalogError),
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Session(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Catalog(e @ CatalogError::SourceNotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Catalog(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

/// Create the HTTP server with all routes
pub fn create_server(session: QuerySession, catalog: SourceCatalog) -> Router {
    let state = Arc::new(AppState { session, catalog });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(run_query).get(query_state))
        .route("/api/query/stop", post(stop_query))
        .route("/api/query/stale", post(check_stale))
        .route("/api/query/results.csv", get(export_results))
        .route("/api/query/stream", get(stream_state))
        .route("/api/sources", get(list_sources))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Encodes a term the way `application/sparql-results+json` does.
pub fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(node) => json!({ "type": "uri", "value": node.as_str() }),
        Term::BlankNode(node) => json!({ "type": "bnode", "value": node.as_str() }),
        Term::Literal(literal) => {
            let mut object = Map::new();
            object.insert("type".into(), "literal".into());
            object.insert("value".into(), literal.value().into());
            if let Some(language) = literal.language() {
                object.insert("xml:lang".into(), language.into());
            } else if literal.datatype().as_str() != "http://www.w3.org/2001/XMLSchema#string" {
                object.insert("datatype".into(), literal.datatype().as_str().into());
            }
            Value::Object(object)
        }
        #[allow(unreachable_patterns)]
        other => json!({ "type": "triple", "value": other.to_string() }),
    }
}

fn run_state_name(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "idle",
        RunState::Running => "running",
        RunState::StoppedComplete => "stopped_complete",
        RunState::StoppedInterrupted => "stopped_interrupted",
        RunState::Errored => "errored",
    }
}

/// Serializes a session view for clients.
pub fn view_to_json(view: &SessionView) -> Value {
    let status = &view.status;
    let results: Vec<Value> = view
        .results
        .iter()
        .map(|record| {
            let bindings: Map<String, Value> = record
                .iter()
                .filter_map(|(variable, term)| {
                    term.map(|t| (variable.as_str().to_string(), term_to_json(t)))
                })
                .collect();
            Value::Object(bindings)
        })
        .collect();

    json!({
        "run_id": status.run_id,
        "run_state": run_state_name(status.run_state),
        "is_running": status.is_running(),
        "columns": status.columns.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
        "last_submitted": status.last_submitted.as_ref().map(|s: &Submission| json!({
            "query": s.query,
            "sources": s.sources,
        })),
        "possibly_incomplete": status.possibly_incomplete,
        "error_message": status.error_message,
        "ms_elapsed": view.ms_elapsed(),
        "elapsed": view.seconds_string(),
        "result_count": view.results.len(),
        "results": results,
    })
}

impl AppState {
    /// Catalog sources followed by validated custom sources.
    fn sources_for(&self, request: &RunQueryRequest) -> Result<Vec<Source>, ApiError> {
        let mut sources = self.catalog.resolve(request.sources.as_slice())?;
        for custom in &request.custom_sources {
            source_catalog::validate(custom)?;
            sources.push(custom.clone());
        }
        Ok(sources)
    }
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(SuccessResponse {
        message: "Quarry HTTP API is running".to_string(),
    })
}

/// POST /api/query - Submit a query, interrupting any run in progress
async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunQueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let sources = state.sources_for(&payload)?;
    QuerySession::check_submission(&payload.query, &sources)?;

    // Spawned so a disconnecting client cannot leave the run pending.
    let session = state.session.clone();
    let query = payload.query;
    tokio::spawn(async move { session.run_query(&query, &sources).await })
        .await
        .map_err(|e| ApiError::InternalError(format!("Query task failed: {}", e)))??;

    Ok(Json(view_to_json(&state.session.view())))
}

/// GET /api/query - Current state and results
async fn query_state(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(view_to_json(&state.session.view()))
}

/// POST /api/query/stop - Interrupt the running query
async fn stop_query(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    let message = if state.session.stop_query() {
        "Query stopped".to_string()
    } else {
        "No query in progress".to_string()
    };
    Json(SuccessResponse { message })
}

/// POST /api/query/stale - Whether the given inputs differ from the last submission
async fn check_stale(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunQueryRequest>,
) -> Result<Json<StaleResponse>, ApiError> {
    let sources = state.sources_for(&payload)?;
    Ok(Json(StaleResponse {
        stale: state.session.is_stale(&payload.query, &sources),
    }))
}

/// GET /api/query/results.csv - Download results as SPARQL CSV
async fn export_results(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let csv = state
        .session
        .export_csv()
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(match csv {
        Some(body) => {
            let headers = [(header::CONTENT_TYPE, "text/csv; charset=utf-8")];
            (headers, body).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// GET /api/sources - List catalog sources
async fn list_sources(State(state): State<Arc<AppState>>) -> Json<ListSourcesResponse> {
    let sources = state.catalog.list_all();
    let total = sources.len();
    Json(ListSourcesResponse { sources, total })
}

/// WS /api/query/stream - Push state on every status or results change.
/// Any message from the client requests a fresh copy.
async fn stream_state(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut status = state.session.subscribe_status();
    let mut results = state.session.subscribe_results();
    status.mark_unchanged();
    results.mark_unchanged();

    loop {
        let message = Message::Text(view_to_json(&state.session.view()).to_string());
        if socket.send(message).await.is_err() {
            tracing::debug!("WebSocket client disconnected");
            return;
        }

        tokio::select! {
            changed = status.changed() => if changed.is_err() { return },
            changed = results.changed() => if changed.is_err() { return },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
        status.mark_unchanged();
        results.mark_unchanged();
    }
}

/// Start the HTTP server on the specified address
pub async fn start_server(
    addr: &str,
    session: QuerySession,
    catalog: SourceCatalog,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(session, catalog);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Quarry HTTP API server listening on http://{}", addr);
    println!();
    println!("Available endpoints:");
    println!("  POST   /api/query               - Run a query (interrupts the current one)");
    println!("  GET    /api/query               - Current state and results");
    println!("  POST   /api/query/stop          - Stop the running query");
    println!("  POST   /api/query/stale         - Check whether inputs changed since the last run");
    println!("  GET    /api/query/results.csv   - Download results as CSV");
    println!("  WS     /api/query/stream        - Stream state updates (WebSocket)");
    println!("  GET    /api/sources             - List known sources");
    println!("  GET    /health                  - Health check");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}
