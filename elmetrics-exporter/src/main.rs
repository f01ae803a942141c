// ELMetrics Exporter - Prometheus exporter for ECHONET Lite devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # ELMetrics Exporter
//!
//! Prometheus exporter for ECHONET Lite energy, water and climate devices.
//! Every scrape of `/metrics` runs one poll cycle over the discovered
//! devices.
//!
//! ## Usage
//!
//! ```bash
//! # Serve a recorded fixture
//! elmetrics-exporter --fixture demos/fixture.csv
//!
//! # Use a config file, overriding the port
//! elmetrics-exporter --config config.json --port 9464
//! ```

mod config;

#[cfg(feature = "replay")]
mod replay;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use clap::Parser;
use config::{ConfigFileError, FileConfig, Overrides};
use elmetrics::{DeviceTransport, ElMetricsError, Exporter, StaticTransport};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "replay")]
use replay::{Fixture, FixtureInfo, ReplayError};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// ECHONET Lite Prometheus Exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on
    #[arg(short, long)]
    address: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// CSV fixture to serve instead of a live network
    #[arg(short, long)]
    fixture: Option<String>,

    /// Discovery window in seconds
    #[arg(long)]
    discovery_secs: Option<u64>,

    /// Devices polled at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-property fetch timeout in milliseconds
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            address: self.address.clone(),
            port: self.port,
            discovery_secs: self.discovery_secs,
            concurrency: self.concurrency,
            fetch_timeout_ms: self.fetch_timeout_ms,
        }
    }
}

/// Errors that stop the exporter before it serves.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("Configuration: {0}")]
    Config(#[from] ConfigFileError),

    #[cfg(feature = "replay")]
    #[error("Fixture: {0}")]
    Replay(#[from] ReplayError),

    #[error("Exporter: {0}")]
    Exporter(#[from] ElMetricsError),

    #[error("Server: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers.
struct AppState {
    exporter: Arc<Exporter>,
    discovered: AtomicBool,
    #[cfg(feature = "replay")]
    fixture_info: Option<FixtureInfo>,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ELMetrics Exporter v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    let file_config = match args.config {
        Some(ref path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = file_config.merge(args.overrides())?;

    // Build transport
    #[cfg(feature = "replay")]
    let (transport, fixture_info) = match args.fixture {
        Some(ref path) => {
            let fixture = Fixture::from_csv(path)?;
            let info = fixture.info();
            (fixture.into_transport(), Some(info))
        }
        None => {
            warn!("No fixture specified, serving an empty device set");
            (StaticTransport::new(), None)
        }
    };

    #[cfg(not(feature = "replay"))]
    let transport = {
        if args.fixture.is_some() {
            warn!("Replay feature not enabled, ignoring --fixture argument");
        }
        StaticTransport::new()
    };

    let transport: Arc<dyn DeviceTransport> = Arc::new(transport);

    // Rule/gauge mismatches are fatal here, before the listener is bound
    let exporter = Arc::new(Exporter::builtin(transport, config.exporter_config())?);

    let state = Arc::new(AppState {
        exporter: Arc::clone(&exporter),
        discovered: AtomicBool::new(false),
        #[cfg(feature = "replay")]
        fixture_info,
        start_time: std::time::Instant::now(),
    });

    // Discovery runs while the server starts
    let discovery_state = Arc::clone(&state);
    tokio::spawn(async move {
        discovery_state.exporter.discover().await;
        discovery_state.discovered.store(true, Ordering::SeqCst);
    });

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    // Start server
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    exporter.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>ELMetrics Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>ELMetrics Exporter</h1>
    <p>Prometheus exporter for ECHONET Lite energy, water and climate devices.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div><a href="/metrics">/metrics</a> - Prometheus metrics (polls all devices)</div>
        <div><a href="/health">/health</a> - Health check</div>
        <div><a href="/ready">/ready</a> - Ready once discovery has finished</div>
        <div><a href="/status">/status</a> - Status information (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>total_power_watts</code>, <code>circuit_power_watts</code> - Distribution panel power</li>
        <li><code>power_total_in_kwh</code>, <code>power_total_out_kwh</code> - Distribution panel energy</li>
        <li><code>power_generated_watts</code>, <code>power_generated_kwh</code>, <code>power_sold_kwh</code> - Solar generation</li>
        <li><code>water_*</code> - Water meter and water heater</li>
        <li><code>air_conditioner_temperature_celsius</code> - Indoor/outdoor temperature</li>
        <li><code>echonet_exporter_*</code> - Exporter self-metrics</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - polls devices and returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.exporter.poll_and_export().await {
        Ok(text) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], text),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.discovered.load(Ordering::SeqCst) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Discovering")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    discovered: bool,
    device_count: usize,
    devices: Vec<DeviceStatus>,
    #[cfg(feature = "replay")]
    #[serde(skip_serializing_if = "Option::is_none")]
    fixture: Option<FixtureInfo>,
}

/// One discovered device.
#[derive(Serialize)]
struct DeviceStatus {
    address: String,
    group: String,
    class: String,
    supported: bool,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let registry = state.exporter.poller().registry();
    let devices: Vec<DeviceStatus> = state
        .exporter
        .devices()
        .await
        .into_iter()
        .map(|device| DeviceStatus {
            group: elmetrics::group_name(device.class.group).into_owned(),
            class: elmetrics::class_name(device.class.group, device.class.class).into_owned(),
            supported: registry.supports(device.class),
            address: device.address,
        })
        .collect();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        discovered: state.discovered.load(Ordering::SeqCst),
        device_count: devices.len(),
        devices,
        #[cfg(feature = "replay")]
        fixture: state.fixture_info.clone(),
    })
}
