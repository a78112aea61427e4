//! HTTP Server for the KPI dashboard API.
//!
//! An upload is ingested once and kept in the [`SessionStore`]; every later
//! interaction (filters, thresholds, charts) re-derives a report from the
//! stored table.
//!
//! # API Endpoints
//!
//! | Method | Path                          | Description                       |
//! |--------|-------------------------------|-----------------------------------|
//! | GET    | `/health`                     | Health check                      |
//! | POST   | `/api/upload`                 | Upload CSV, create a session      |
//! | GET    | `/api/sessions`               | List live sessions                |
//! | POST   | `/api/sessions/{id}/report`   | Derive a report                   |
//! | GET    | `/api/sessions/{id}/options`  | Filter choices                    |
//! | PUT    | `/api/sessions/{id}/view`     | Replace view settings             |
//! | DELETE | `/api/sessions/{id}`          | End a session                     |
//! | GET    | `/api/logs`                   | SSE stream for real-time logs     |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{delete, get, post, put},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{error_response, SessionReport, UploadResponse};
use crate::cache::{Session, SessionInfo, SessionStore};
use crate::config::AppConfig;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::models::{FilterCriteria, Thresholds, ViewSettings};
use crate::parser::ColumnAliases;
use crate::transform::{
    build_report, default_charts, ingest, DashboardReport, FilterOptions, IngestOptions, ReportRequest,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub config: Arc<AppConfig>,
    pub aliases: Arc<ColumnAliases>,
}

impl AppState {
    pub fn new(config: AppConfig, aliases: ColumnAliases) -> Self {
        Self {
            store: Arc::new(SessionStore::new(config.max_sessions, config.session_ttl_secs)),
            config: Arc::new(config),
            aliases: Arc::new(aliases),
        }
    }

    fn session(&self, id: &str) -> ServerResult<Session> {
        self.store
            .get(id)
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string()))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Pipeline(PipelineError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() || status == StatusCode::UNPROCESSABLE_ENTITY {
            log_error(self.to_string());
        }
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

/// Build the router; split from [`start_server`] so it can be driven in tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_csv))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/sessions/{id}/report", post(session_report))
        .route("/api/sessions/{id}/options", get(session_options))
        .route("/api/sessions/{id}/view", put(update_view))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig, aliases: ColumnAliases) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(AppState::new(config, aliases));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    eprintln!("🚀 nockpi server running on http://localhost:{}", port);
    eprintln!("   POST /api/upload                 - Upload KPI CSV");
    eprintln!("   POST /api/sessions/{{id}}/report   - Derive dashboard report");
    eprintln!("   GET  /api/logs                   - SSE log stream");
    eprintln!("   GET  /health                     - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "nockpi",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "report": "POST /api/sessions/{id}/report",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload CSV endpoint
async fn upload_csv(State(state): State<AppState>, mut multipart: Multipart) -> ServerResult<Json<UploadResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;

    log_info(format!(
        "📄 New upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let options = IngestOptions {
        aliases: state.aliases.as_ref().clone(),
        delimiter: None,
        geo: state.config.geo,
    };

    let ingested = tokio::task::spawn_blocking(move || ingest(&bytes, &options))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    let session = state.store.create(ingested, file_name);
    let request = ReportRequest {
        thresholds: state.config.thresholds,
        view: session.view.clone(),
        ..ReportRequest::default()
    };
    let report = derive(&session, request).await?;

    log_success(format!("Session {} ready ({} rows)", session.id, session.ingested.table.len()));
    Ok(Json(UploadResponse::new(&session, report)))
}

/// Report request as sent by clients; thresholds fall back to the server defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReportBody {
    filters: FilterCriteria,
    thresholds: Option<Thresholds>,
    charts: Option<Vec<String>>,
}

async fn session_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReportBody>,
) -> ServerResult<Json<SessionReport>> {
    let session = state.session(&id)?;
    let request = ReportRequest {
        filters: body.filters,
        thresholds: body.thresholds.unwrap_or(state.config.thresholds),
        charts: body.charts.unwrap_or_else(default_charts),
        view: session.view.clone(),
    };

    let report = derive(&session, request).await?;
    Ok(Json(SessionReport { session_id: id, report }))
}

/// Build a report off the async runtime; the session's table is shared, not copied.
async fn derive(session: &Session, request: ReportRequest) -> ServerResult<DashboardReport> {
    let ingested = Arc::clone(&session.ingested);
    let report = tokio::task::spawn_blocking(move || build_report(&ingested.table, &request))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
    Ok(report)
}

async fn session_options(State(state): State<AppState>, Path(id): Path<String>) -> ServerResult<Json<FilterOptions>> {
    let session = state.session(&id)?;
    Ok(Json(FilterOptions::from_table(&session.ingested.table)))
}

async fn update_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(view): Json<ViewSettings>,
) -> ServerResult<Json<ViewSettings>> {
    state
        .store
        .update_view(&id, view)
        .map(Json)
        .ok_or(ServerError::SessionNotFound(id))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> ServerResult<StatusCode> {
    if state.store.remove(&id) {
        log_info(format!("Session {} closed", id));
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::SessionNotFound(id))
    }
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.store.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "nockpi-boundary";

    fn upload_request(field: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"kpi.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
            b = BOUNDARY,
        );
        Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn status_of(err: ServerError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        let schema = ServerError::Pipeline(PipelineError::Schema(SchemaError::MissingColumn("lat".into())));
        assert_eq!(status_of(schema), StatusCode::UNPROCESSABLE_ENTITY);

        let threshold = ServerError::Pipeline(PipelineError::InvalidThreshold {
            name: "prb",
            value: 10.0,
            min: 70.0,
            max: 100.0,
        });
        assert_eq!(status_of(threshold), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(status_of(ServerError::SessionNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ServerError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ServerError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_report_body_defaults() {
        let body: ReportBody = serde_json::from_str(r#"{"filters": {"band": "L900"}}"#).unwrap();
        assert!(body.thresholds.is_none());
        assert!(body.charts.is_none());
        assert!(!body.filters.band.is_all());
    }

    #[tokio::test]
    async fn test_upload_creates_session() {
        let state = AppState::new(AppConfig::default(), ColumnAliases::builtin());
        let csv = "date,site,traffic_gb,availability,lat,lon\n2024-01-01,SiteA,10,94,-6.2,106.8";

        let (status, body) = send(&state, upload_request("file", csv)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["fileName"], "kpi.csv");
        assert_eq!(body["report"]["congestion"]["count"], 1);
        let id = body["sessionId"].as_str().unwrap();
        assert!(state.store.get(id).is_some());
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let state = AppState::new(AppConfig::default(), ColumnAliases::builtin());

        let (status, body) = send(&state, upload_request("attachment", "date,site\n")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_upload_missing_column() {
        let state = AppState::new(AppConfig::default(), ColumnAliases::builtin());
        let csv = "date,traffic_gb,availability\n2024-01-01,10,99";

        let (status, body) = send(&state, upload_request("file", csv)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Missing required column: site");
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_session_report_flow() {
        let state = AppState::new(AppConfig::default(), ColumnAliases::builtin());
        let csv = "date,site,traffic_gb,availability,lat,lon\n2024-01-01,SiteA,10,94,-6.2,106.8\n";
        let ingested = ingest(csv.as_bytes(), &IngestOptions::default()).unwrap();
        let session = state.store.create(ingested, None);

        let Json(response) = session_report(
            State(state.clone()),
            Path(session.id.clone()),
            Json(ReportBody::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.report.congestion.count, 1);

        let missing = session_options(State(state), Path("nope".into())).await.unwrap_err();
        assert_eq!(status_of(missing), StatusCode::NOT_FOUND);
    }
}
