use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use qrdesk_qr::QrCodec;
use qrdesk_server::ServerConfig;
use qrdesk_settings::QrdeskSettings;
use qrdesk_store::Database;
use qrdesk_telemetry::TelemetryConfig;

/// QR capture and print-dispatch server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file (defaults to ~/.qrdesk/settings.json).
    #[arg(long, env = "QRDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address.
    #[arg(long)]
    host: Option<String>,

    /// Bind port.
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file.
    #[arg(long)]
    database: Option<PathBuf>,
}

impl Args {
    fn apply(&self, settings: &mut QrdeskSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db) = &self.database {
            settings.storage.database_path = db.to_string_lossy().into_owned();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings_file = args.config.clone().unwrap_or_else(qrdesk_settings::settings_path);
    let mut settings = qrdesk_settings::load_settings_from_path(&settings_file)
        .with_context(|| format!("loading settings from {}", settings_file.display()))?;
    args.apply(&mut settings);

    let telemetry = TelemetryConfig::from_level_str(&settings.logging.level, settings.logging.json);
    qrdesk_telemetry::init_telemetry(&telemetry);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting qrdesk");

    let db_path = PathBuf::from(&settings.storage.database_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;

    let codec = QrCodec::new(settings.qr.module_size, settings.qr.border);
    let config = ServerConfig::from_settings(&settings);
    let handle = qrdesk_server::start(config, db, codec)
        .await
        .context("starting server")?;

    tracing::info!(port = handle.port, "qrdesk ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}
