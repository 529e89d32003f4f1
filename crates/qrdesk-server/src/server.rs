use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use qrdesk_qr::QrCodec;
use qrdesk_settings::QrdeskSettings;
use qrdesk_store::{Database, ScanRepo};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatcher::PrintDispatcher;
use crate::handlers;
use crate::queue::{DispatchQueue, DispatchWorker};
use crate::registry::ConnectionRegistry;

const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub dispatch_queue_capacity: usize,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_settings(settings: &QrdeskSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            api_prefix: settings.server.api_prefix.clone(),
            max_send_queue: settings.server.max_send_queue,
            heartbeat_interval: Duration::from_secs(settings.server.heartbeat_interval_secs)
                .max(MIN_HEARTBEAT),
            dispatch_queue_capacity: settings.dispatch.queue_capacity,
            upload_dir: PathBuf::from(&settings.storage.upload_dir),
            max_upload_bytes: settings.storage.max_upload_bytes,
        }
    }

    /// Request body ceiling: a base64 upload of `max_upload_bytes` plus
    /// room for the surrounding JSON.
    fn body_limit(&self) -> usize {
        (self.max_upload_bytes / 3 + 1)
            .saturating_mul(4)
            .saturating_add(64 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&QrdeskSettings::default())
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<PrintDispatcher>,
    pub queue: DispatchQueue,
    pub scans: Arc<ScanRepo>,
    pub codec: QrCodec,
    pub started_at: Instant,
}

impl AppState {
    /// Wire up the registry, dispatcher and scan store. The returned worker
    /// must be spawned for scan-triggered prints to go out.
    pub fn new(config: ServerConfig, db: Database, codec: QrCodec) -> (Self, DispatchWorker) {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(PrintDispatcher::new(Arc::clone(&registry), Arc::new(codec)));
        let (queue, worker) = DispatchQueue::new(config.dispatch_queue_capacity);

        let state = Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            queue,
            scans: Arc::new(ScanRepo::new(db)),
            codec,
            started_at: Instant::now(),
        };
        (state, worker)
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/ws/print/{client_id}", get(handlers::ws_print))
        .route("/print", post(handlers::print))
        .route("/printers", get(handlers::printers))
        .route("/scans", get(handlers::list_scans))
        .route("/scans/scan", post(handlers::create_scan))
        .route("/scans/scan-from-image", post(handlers::scan_from_image))
        .route("/scans/manual-scan", post(handlers::manual_scan))
        .route("/scans/generate-qr/{data}", get(handlers::generate_qr))
        .route(
            "/scans/{scan_id}",
            get(handlers::get_scan).delete(handlers::delete_scan),
        );

    let prefix = state.config.api_prefix.trim_end_matches('/');
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health));
    let router = if prefix.is_empty() {
        router.merge(api)
    } else {
        router.nest(prefix, api)
    };

    let body_limit = state.config.body_limit();
    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it running.
pub async fn start(
    config: ServerConfig,
    db: Database,
    codec: QrCodec,
) -> Result<ServerHandle, std::io::Error> {
    let addr = format!("{}:{}", config.host, config.port);
    let (state, worker) = AppState::new(config, db.clone(), codec);

    let worker = worker.spawn(Arc::clone(&state.dispatcher), Some(ScanRepo::new(db)));
    let registry = Arc::clone(&state.registry);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "qrdesk server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        _server: server,
        _worker: worker,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub registry: Arc<ConnectionRegistry>,
    _server: tokio::task::JoinHandle<()>,
    _worker: tokio::task::JoinHandle<()>,
}
