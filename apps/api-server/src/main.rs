//! api-server — HTTP API for the URL Shortener workspace.
//!
//! Thin plumbing over `domain::service::LinkService`:
//! - Storage: SQLite (default, `sqlite` feature) or in-memory.
//! - Codes: random alphanumeric, policy configurable via `CODE_*` variables.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string).
//!
//! Routes:
//! - `GET /health`
//! - `POST /shorten` create a link (optional `custom_code`, `expires_at`)
//! - `GET /` list active links
//! - `GET /:code` redirect (302), 404 unknown/deleted, 410 expired
//! - `GET /:code/info`, `GET /:code/stats`
//! - `PUT|PATCH /:code` update target and/or expiration
//! - `DELETE /:code` soft delete
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # throwaway in-memory storage, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryRepo;
use domain::code::RandomCodeGenerator;
use domain::service::LinkService;
use domain::{
    CoreError, LinkRepository, LinkUpdate, NewLink, ShortCode, ShortLink, SystemClock,
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local repo abstraction supporting memory or sqlite (feature-gated).
enum AnyRepo {
    Memory(InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
}

macro_rules! dispatch {
    ($self:ident, $repo:ident => $call:expr) => {
        match $self {
            AnyRepo::Memory($repo) => $call,
            #[cfg(feature = "sqlite")]
            AnyRepo::Sqlite($repo) => $call,
        }
    };
}

impl LinkRepository for AnyRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        dispatch!(self, r => r.insert(link))
    }

    fn get(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        dispatch!(self, r => r.get(code))
    }

    fn update(&self, link: &ShortLink) -> Result<(), CoreError> {
        dispatch!(self, r => r.update(link))
    }

    fn delete(&self, code: &ShortCode, deleted_at: SystemTime) -> Result<(), CoreError> {
        dispatch!(self, r => r.delete(code, deleted_at))
    }

    fn increment_clicks(&self, code: &ShortCode) -> Result<(), CoreError> {
        dispatch!(self, r => r.increment_clicks(code))
    }

    fn list(&self, limit: usize) -> Result<Vec<ShortLink>, CoreError> {
        dispatch!(self, r => r.list(limit))
    }
}

type Links = LinkService<AnyRepo, RandomCodeGenerator, SystemClock>;

#[derive(Clone)]
struct AppState {
    links: Arc<Links>,
    shortlink_domain: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_unusual();

    let repo = match build_repo(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, db_path = %cfg.db_path.display(), "failed to open storage");
            std::process::exit(1);
        }
    };
    let links = LinkService::with_random_codes(repo, SystemClock, cfg.code_policy);
    let state = AppState {
        links: Arc::new(links),
        shortlink_domain: cfg.shortlink_domain.clone(),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
    info!("api-server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(err = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo(cfg: &config::Config) -> Result<AnyRepo, CoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            let repo = sqlite_adapter::SqliteRepo::new(&cfg.db_path)?;
            info!(db_path = %cfg.db_path.display(), "using sqlite storage");
            Ok(AnyRepo::Sqlite(repo))
        }
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => {
            warn!("built without the `sqlite` feature; falling back to in-memory storage");
            Ok(AnyRepo::Memory(InMemoryRepo::new()))
        }
        config::StorageProvider::Memory => Ok(AnyRepo::Memory(InMemoryRepo::new())),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/shorten", axum::routing::post(create_link))
        .route("/", get(list_links))
        .route(
            "/:code",
            get(redirect)
                .put(update_link)
                .patch(update_link)
                .delete(delete_link),
        )
        .route("/:code/info", get(link_info))
        .route("/:code/stats", get(link_stats))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateLinkReq {
    original_url: String,
    #[serde(default)]
    custom_code: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(Deserialize)]
struct UpdateLinkReq {
    #[serde(default)]
    original_url: Option<String>,
    /// Absent leaves the expiration alone; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    expires_at: Option<Option<String>>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct CreatedOut {
    original_url: String,
    short_code: String,
    short_url: String,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

#[derive(Serialize)]
struct LinkOut {
    original_url: String,
    short_code: String,
    short_url: String,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    clicks: u64,
    is_active: bool,
}

#[derive(Serialize)]
struct StatsOut {
    short_code: String,
    clicks: u64,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    is_active: bool,
}

#[derive(Serialize)]
struct DeletedOut {
    message: &'static str,
    short_code: String,
}

fn short_url(state: &AppState, headers: &HeaderMap, code: &ShortCode) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    http_common::build_short_url(state.shortlink_domain.as_deref(), host, code.as_str())
}

fn link_to_out(link: ShortLink, state: &AppState, headers: &HeaderMap) -> LinkOut {
    LinkOut {
        short_url: short_url(state, headers, &link.code),
        short_code: link.code.as_str().to_string(),
        original_url: link.target_url,
        created_at: http_common::system_time_to_rfc3339(link.created_at),
        expires_at: link.expires_at.map(http_common::system_time_to_rfc3339),
        clicks: link.click_count,
        is_active: link.is_active,
    }
}

// Map a domain error to a status code and structured JSON body.
fn error_response(err: CoreError) -> Response {
    let (status, code) = match &err {
        CoreError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
        CoreError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, "invalid_code"),
        CoreError::DuplicateCode => (StatusCode::CONFLICT, "conflict"),
        CoreError::NotFound | CoreError::Inactive => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::Expired => (StatusCode::GONE, "gone"),
        CoreError::GenerationExhausted { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "exhausted"),
        CoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    let body = if status == StatusCode::BAD_REQUEST {
        http_common::json_error_with_message(code, &err.to_string())
    } else {
        http_common::json_err(code)
    };
    if status.is_server_error() {
        error!(err = %err, "request failed");
    }
    (status, Json(body)).into_response()
}

// Codes that could never have been issued are reported as missing.
fn parse_code(raw: String) -> Result<ShortCode, Response> {
    ShortCode::new(raw).map_err(|_| {
        warn!("bad code in path");
        error_response(CoreError::NotFound)
    })
}

fn parse_time(field: &str, raw: &str) -> Result<SystemTime, Response> {
    http_common::rfc3339_to_system_time(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "bad_request",
                &format!("{field} must be an RFC 3339 timestamp: {e}"),
            )),
        )
            .into_response()
    })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLinkReq>,
) -> Response {
    let expires_at = match body.expires_at.as_deref().map(|s| parse_time("expires_at", s)) {
        Some(Ok(t)) => Some(t),
        Some(Err(resp)) => return resp,
        None => None,
    };
    let input = NewLink {
        target_url: body.original_url,
        custom_code: body.custom_code.filter(|c| !c.is_empty()),
        expires_at,
    };
    match state.links.create(input) {
        Ok(link) => {
            info!(code = %link.code, target = %link.target_url, "create ok");
            let out = CreatedOut {
                short_url: short_url(&state, &headers, &link.code),
                short_code: link.code.as_str().to_string(),
                original_url: link.target_url,
                created_at: http_common::system_time_to_rfc3339(link.created_at),
                expires_at: link.expires_at.map(http_common::system_time_to_rfc3339),
            };
            (StatusCode::CREATED, Json(out)).into_response()
        }
        Err(e) => {
            warn!(err = %e, "create rejected");
            error_response(e)
        }
    }
}

async fn list_links(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Response {
    let limit = q.limit.unwrap_or(100).clamp(1, 500);
    match state.links.list(limit) {
        Ok(links) => {
            let out: Vec<LinkOut> = links
                .into_iter()
                .map(|l| link_to_out(l, &state, &headers))
                .collect();
            Json(out).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn redirect(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.links.resolve(&code) {
        Ok(target) => {
            info!(code = %code, redirect_to = %target, "resolve ok");
            (StatusCode::FOUND, [(header::LOCATION, target)]).into_response()
        }
        Err(e) => {
            if !matches!(e, CoreError::Storage(_)) {
                warn!(code = %code, err = %e, "resolve miss");
            }
            error_response(e)
        }
    }
}

async fn link_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.links.get(&code) {
        Ok(link) => Json(link_to_out(link, &state, &headers)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn link_stats(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.links.get_stats(&code) {
        Ok(stats) => Json(StatsOut {
            short_code: stats.code.as_str().to_string(),
            clicks: stats.click_count,
            created_at: http_common::system_time_to_rfc3339(stats.created_at),
            expires_at: stats.expires_at.map(http_common::system_time_to_rfc3339),
            is_active: stats.is_active,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(body): Json<UpdateLinkReq>,
) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let expires_at = match body.expires_at {
        None => None,
        Some(None) => Some(None),
        Some(Some(raw)) => match parse_time("expires_at", &raw) {
            Ok(t) => Some(Some(t)),
            Err(resp) => return resp,
        },
    };
    let changes = LinkUpdate {
        target_url: body.original_url,
        expires_at,
    };
    match state.links.update(&code, changes) {
        Ok(link) => {
            info!(code = %code, "update ok");
            Json(link_to_out(link, &state, &headers)).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn delete_link(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.links.delete(&code) {
        Ok(()) => Json(DeletedOut {
            message: "URL deleted successfully",
            short_code: code.as_str().to_string(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}
