//! main.rs — Telemetry simulator entry point
//!
//! Runs:
//!   1. The pipeline: seeder → bounded queue → multicast sender
//!   2. WebSocket control panel (start / pause / resume / stop / set_hz),
//!      relaying every SimEvent to connected clients as JSON
//!
//! Without the control panel the process exits when the run completes.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use clap::Parser;
use serde_json::json;
use telemetry_types::ContainerFile;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use telemetry_simulator::{EventBus, FullConfig, LogLevel, Pipeline, PipelineError, SeedingEngine};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "telemetry-sim", about = "Waveform telemetry simulator (UDP multicast)")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Load parameters and template records from a .dat container
    #[arg(long)]
    dat: Option<PathBuf>,
    /// Multicast group
    #[arg(long)]
    group: Option<Ipv4Addr>,
    /// Destination port
    #[arg(long)]
    port: Option<u16>,
    /// Records per second
    #[arg(long)]
    hz: Option<f64>,
    /// Simulation start time (s)
    #[arg(long)]
    start: Option<f64>,
    /// Simulation end time (s, inclusive)
    #[arg(long)]
    end: Option<f64>,
    /// Multicast TTL
    #[arg(long)]
    ttl: Option<u32>,
    /// Control panel WebSocket port
    #[arg(long)]
    ctrl_port: Option<u16>,
    /// Run once without the control panel
    #[arg(long)]
    no_control: bool,
    /// Write the configured parameter set as a .dat container and exit
    #[arg(long)]
    write_dat: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut FullConfig) {
        if let Some(group) = self.group {
            cfg.network.group = group;
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(ttl) = self.ttl {
            cfg.network.ttl = ttl;
        }
        if let Some(hz) = self.hz {
            cfg.simulation.hz = hz;
        }
        if let Some(start) = self.start {
            cfg.simulation.start_time = start;
        }
        if let Some(end) = self.end {
            cfg.simulation.end_time = end;
        }
        if let Some(port) = self.ctrl_port {
            cfg.control.port = port;
        }
        if self.no_control {
            cfg.control.enabled = false;
        }
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct SimState {
    cfg: FullConfig,
    /// Raw records from a loaded container, reused as templates
    template: Vec<u8>,
    events: EventBus,
    pipeline: Option<Pipeline>,
}

type SharedState = Arc<RwLock<SimState>>;

impl SimState {
    async fn start_run(&mut self) -> Result<(), PipelineError> {
        let engine = SeedingEngine::new(self.cfg.parameters.clone(), self.cfg.record).with_template(&self.template);
        let pipeline = Pipeline::start_multicast(
            self.cfg.pipeline_config(),
            engine,
            &self.cfg.network,
            self.events.clone(),
        )
        .await?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    async fn stop_run(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let summary = pipeline.stop().await;
            info!(
                "⏹ Run ended ({}): {} records / {} bytes sent",
                summary.state.label(),
                summary.stats.records_sent,
                summary.stats.bytes_sent
            );
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_simulator=info,telemetry_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut cfg = FullConfig::load(&args.config).context("loading config")?;
    cfg.network.apply_env();
    args.apply(&mut cfg);

    let mut template = Vec::new();
    if let Some(path) = &args.dat {
        let file = ContainerFile::load(path).with_context(|| format!("loading {}", path.display()))?;
        info!(
            "📂 {}: {} parameters, {} template bytes",
            path.display(),
            file.parameters.len(),
            file.records.len()
        );
        cfg.parameters = file.parameters;
        template = file.records;
    }

    cfg.validate().context("invalid configuration")?;
    for issue in cfg.parameters.validate_layout(&cfg.record) {
        warn!("Layout: {issue}");
    }

    if let Some(path) = &args.write_dat {
        ContainerFile::new(cfg.parameters.clone(), Vec::new())
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("💾 Wrote {} parameters to {}", cfg.parameters.len(), path.display());
        return Ok(());
    }

    info!(
        "🛰  Telemetry simulator starting: {} parameters, {}×{}B records at {} Hz → {}:{}",
        cfg.parameters.len(),
        cfg.record.packets_per_record,
        cfg.record.packet_length,
        cfg.simulation.hz,
        cfg.network.group,
        cfg.network.port
    );

    let control = cfg.control.clone();
    let shared: SharedState = Arc::new(RwLock::new(SimState {
        cfg,
        template,
        events: EventBus::default(),
        pipeline: None,
    }));

    shared.write().await.start_run().await.context("starting run")?;

    if !control.enabled {
        return run_headless(shared).await;
    }

    // Control WebSocket server
    let ctrl_addr = format!("0.0.0.0:{}", control.port);
    info!("🖥  Control panel WebSocket at ws://{ctrl_addr}/ws");

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "telemetry-sim ok" }))
        .with_state(shared.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(&ctrl_addr)
        .await
        .with_context(|| format!("binding control port {ctrl_addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, shutting down");
        })
        .await
        .context("control server")?;

    shared.write().await.stop_run().await;
    Ok(())
}

/// Single run: exit on completion or Ctrl-C.
async fn run_headless(shared: SharedState) -> Result<()> {
    let Some(pipeline) = shared.write().await.pipeline.take() else {
        return Ok(());
    };

    let interrupted = tokio::select! {
        _ = pipeline.finished() => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    let summary = if interrupted {
        info!("Ctrl-C received, stopping");
        pipeline.stop().await
    } else {
        pipeline.wait().await
    };
    info!(
        "🏁 Done ({}): {} records, {} packets, {} bytes, {} send errors",
        summary.state.label(),
        summary.stats.records_sent,
        summary.stats.packets_sent,
        summary.stats.bytes_sent,
        summary.stats.send_errors
    );
    Ok(())
}

// ── WebSocket control handler ─────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn status_json(state: &SharedState) -> String {
    let s = state.read().await;
    let run = s.pipeline.as_ref().map(|p| {
        json!({
            "state": p.state().label(),
            "paused": p.is_paused(),
            "hz": p.hz(),
            "stats": p.stats(),
        })
    });
    json!({ "type": "status", "run": run, "parameters": s.cfg.parameters.len() }).to_string()
}

async fn handle_ws(mut socket: WebSocket, state: SharedState) {
    let mut events = state.read().await.events.subscribe();

    if socket.send(Message::Text(status_json(&state).await)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            // Relay events to client
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(text)).await.is_err() { break; }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("Control: client lagged, {n} events dropped"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Handle commands from web UI
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(cmd))) => {
                    handle_command(&state, &cmd).await;
                    if socket.send(Message::Text(status_json(&state).await)).await.is_err() { break; }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

/// Commands are JSON: { "cmd": "...", "args": {...} }
async fn handle_command(state: &SharedState, raw: &str) {
    let v: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            warn!("Control: ignoring malformed command");
            return;
        }
    };
    let cmd = v["cmd"].as_str().unwrap_or("");
    let mut s = state.write().await;

    match cmd {
        "start" => {
            if s.pipeline.as_ref().is_some_and(|p| !p.state().is_stopped()) {
                warn!("Control: run already active, ignoring start");
                return;
            }
            s.stop_run().await;
            match s.start_run().await {
                Ok(()) => info!("▶ Run started from control panel"),
                Err(e) => {
                    error!("Control: start failed: {e}");
                    s.events.error("control", format!("start failed: {e}"));
                }
            }
        }
        "stop" => s.stop_run().await,
        "pause" | "resume" | "set_hz" => {
            let Some(pipeline) = s.pipeline.as_ref() else {
                warn!("Control: no active run, ignoring {cmd}");
                return;
            };
            match cmd {
                "pause" => pipeline.pause(),
                "resume" => pipeline.resume(),
                _ => {
                    let hz = v["args"]["hz"].as_f64().or_else(|| v["hz"].as_f64());
                    match hz.map(|hz| pipeline.set_hz(hz)) {
                        Some(Ok(())) => info!("⚡ Rate set to {} Hz", pipeline.hz()),
                        Some(Err(e)) => {
                            warn!("Control: {e}");
                            s.events.log(LogLevel::Warn, e.to_string());
                        }
                        None => warn!("Control: set_hz needs a numeric hz"),
                    }
                }
            }
        }
        _ => warn!("Unknown control command: {cmd}"),
    }
}
