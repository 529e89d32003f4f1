//! HTTP and WebSocket route handlers.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use qrdesk_core::job::DEFAULT_PRINTER_LABEL;
use qrdesk_core::{ClientId, PrintJob, ScanId};
use qrdesk_qr::{QrRenderer, MAX_MODULE_SIZE};
use qrdesk_store::{NewScan, ScanQuery, ScanRow};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::connection;
use crate::error::ApiError;
use crate::server::AppState;

/// Upgrade into the printer protocol loop for `client_id`.
pub async fn ws_print(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let client_id = ClientId::from_raw(client_id);
    ws.on_upgrade(move |socket| async move {
        connection::serve_socket(
            socket,
            client_id,
            state.registry,
            state.config.max_send_queue,
            state.config.heartbeat_interval,
        )
        .await;
    })
}

#[derive(Debug, Deserialize)]
pub struct PrintRequest {
    pub qr_data: String,
    pub printer_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Dispatch synchronously and report the outcome.
pub async fn print(
    State(state): State<AppState>,
    Json(req): Json<PrintRequest>,
) -> Result<Json<Value>, ApiError> {
    let job = PrintJob::new(req.qr_data, req.printer_id)
        .with_destination(non_empty(req.client_id).map(ClientId::from_raw));
    let receipt = state.dispatcher.dispatch(&job).await?;
    Ok(Json(json!({
        "message": "Print command sent",
        "client_id": receipt.client_id,
    })))
}

pub async fn printers() -> Json<Value> {
    Json(json!({
        "printers": [
            { "id": "default", "name": "Default printer" },
            { "id": "label_printer", "name": "Label printer" },
        ]
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    pub qr_data: String,
    #[serde(default = "camera")]
    pub scan_type: String,
    #[serde(default)]
    pub printer_id: Option<String>,
}

/// Store a scan; with a printer hint, print it in the background on the
/// default printer.
pub async fn create_scan(
    State(state): State<AppState>,
    Json(req): Json<CreateScanRequest>,
) -> Result<Json<ScanRow>, ApiError> {
    let printer_id = non_empty(req.printer_id);
    let scan = state.scans.create(
        NewScan::new(req.qr_data, req.scan_type).with_printer_id(printer_id.clone()),
    )?;

    if let Some(printer_id) = printer_id {
        state
            .queue
            .submit(PrintJob::new(scan.qr_data.clone(), printer_id).with_origin(scan.id.clone()));
    }
    Ok(Json(scan))
}

#[derive(Debug, Deserialize)]
pub struct ImageScanRequest {
    /// Base64 image, optionally as a `data:` URL.
    pub image_data: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Read the QR code out of an uploaded image, keep the image, store the scan,
/// and print it in the background on `client_id` if given.
pub async fn scan_from_image(
    State(state): State<AppState>,
    Json(req): Json<ImageScanRequest>,
) -> Result<Json<ScanRow>, ApiError> {
    let bytes = qrdesk_qr::decode_base64_payload(&req.image_data).map_err(qr_rejected)?;
    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::BadRequest(format!(
            "image exceeds {} bytes",
            state.config.max_upload_bytes
        )));
    }
    let qr_data = qrdesk_qr::decode_image(&bytes).map_err(qr_rejected)?;

    let file_path = save_upload(&state.config.upload_dir, &bytes).await?;
    let client_id = non_empty(req.client_id);

    let scan = state
        .scans
        .create(NewScan::new(qr_data, "camera").with_printer_id(client_id.clone()))?;
    let scan = state
        .scans
        .set_file_path(&scan.id, &file_path.to_string_lossy())?;

    if let Some(client_id) = client_id {
        let job = PrintJob::new(scan.qr_data.clone(), DEFAULT_PRINTER_LABEL)
            .with_destination(Some(ClientId::from_raw(client_id)))
            .with_origin(scan.id.clone());
        state.queue.submit(job);
    }
    Ok(Json(scan))
}

#[derive(Debug, Deserialize)]
pub struct ManualScanParams {
    pub data: String,
    #[serde(default = "keyboard")]
    pub scan_type: String,
}

/// Keyboard-wedge scanners post the payload as a query parameter.
pub async fn manual_scan(
    State(state): State<AppState>,
    Query(params): Query<ManualScanParams>,
) -> Result<Json<Value>, ApiError> {
    let scan = state.scans.create(NewScan::new(params.data, params.scan_type))?;
    Ok(Json(json!({ "message": "Scan saved", "scan": scan })))
}

#[derive(Debug, Deserialize)]
pub struct ListScansParams {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

pub async fn list_scans(
    State(state): State<AppState>,
    Query(params): Query<ListScansParams>,
) -> Result<Json<Vec<ScanRow>>, ApiError> {
    let query = ScanQuery {
        skip: params.skip,
        limit: params.limit,
        start: parse_date("start_date", params.start_date.as_deref())?,
        end: parse_date("end_date", params.end_date.as_deref())?,
    };
    Ok(Json(state.scans.list(&query)?))
}

pub async fn get_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<ScanRow>, ApiError> {
    Ok(Json(state.scans.get(&ScanId::from_raw(scan_id))?))
}

pub async fn delete_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.scans.delete(&ScanId::from_raw(scan_id))?;
    Ok(Json(json!({ "message": "Scan deleted", "id": removed.id })))
}

#[derive(Debug, Deserialize)]
pub struct GenerateQrParams {
    #[serde(default)]
    pub size: Option<u32>,
}

pub async fn generate_qr(
    State(state): State<AppState>,
    Path(data): Path<String>,
    Query(params): Query<GenerateQrParams>,
) -> Result<Json<Value>, ApiError> {
    let size = params.size.unwrap_or(state.codec.module_size());
    if size == 0 || size > MAX_MODULE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "size must be between 1 and {MAX_MODULE_SIZE}"
        )));
    }
    let qr_image = state.codec.with_module_size(size).render_base64(&data)?;
    Ok(Json(json!({ "qr_image": qr_image, "data": data })))
}

pub async fn root() -> Json<Value> {
    Json(json!({ "name": "qrdesk", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let printers = state.registry.connected();
    Json(json!({
        "status": "healthy",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "connected_printers": printers.len(),
        "printers": printers,
        "default_printer": state.registry.default_destination(),
    }))
}

// ── helpers ─────────────────────────────────────────────────────────────────

fn camera() -> String {
    "camera".to_string()
}

fn keyboard() -> String {
    "keyboard".to_string()
}

fn default_limit() -> u32 {
    100
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn qr_rejected(e: qrdesk_qr::QrError) -> ApiError {
    ApiError::BadRequest(format!("could not process QR code: {e}"))
}

/// RFC 3339 (`Z` or offset), a naive date-time taken as UTC, or a bare date.
fn parse_date(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(naive.and_utc()));
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(naive.and_utc()));
    }
    Err(ApiError::BadRequest(format!("invalid {field}: {raw}")))
}

async fn save_upload(dir: &FsPath, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::Internal(format!("create upload dir: {e}")))?;
    let name = format!(
        "qr_scan_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S_%6f"),
        qrdesk_qr::image_extension(bytes)
    );
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("save upload: {e}")))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "upload saved");
    Ok(path)
}
