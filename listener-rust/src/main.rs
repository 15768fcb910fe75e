//! main.rs — Telemetry listener entry point
//!
//! Joins the multicast group, reassembles records and writes:
//!   - a `.dat` capture (replayable by the simulator with `--dat`)
//!   - a text table of one parameter's values per record
//!
//! Stops on Ctrl-C or after `--idle-timeout` seconds without a packet.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use telemetry_types::{ContainerFile, RecordSpec};
use tracing::{info, warn};

use telemetry_listener::{
    idle_timeout_from_secs, run, Listener, ListenerConfig, MulticastReceiver, SimulatorToml, StopCause,
};

#[derive(Parser, Debug)]
#[command(name = "telemetry-listener", about = "Receive and decode simulator telemetry")]
struct Args {
    /// Multicast group
    #[arg(long)]
    group: Option<Ipv4Addr>,
    /// UDP port
    #[arg(long)]
    port: Option<u16>,
    /// Interface address to join the group on
    #[arg(long)]
    iface: Option<Ipv4Addr>,
    /// Simulator config to take the record layout, rate and parameters from
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// .dat container whose parameter section replaces the configured parameters
    #[arg(long)]
    params: Option<PathBuf>,
    /// Capture output
    #[arg(long, default_value = "received.dat")]
    out_dat: PathBuf,
    /// Parameter table output
    #[arg(long, default_value = "param_log.txt")]
    out_txt: PathBuf,
    /// Seconds without a packet before stopping (0 waits forever)
    #[arg(long, default_value_t = 5.0)]
    idle_timeout: f64,
    #[arg(long)]
    packet_length: Option<usize>,
    #[arg(long)]
    packets_per_record: Option<usize>,
    /// Byte offset of the record timestamp in each packet
    #[arg(long)]
    time_offset: Option<usize>,
    /// Sender rate, for minor-cycle sample times
    #[arg(long)]
    hz: Option<f64>,
    /// Parameter to tabulate (first enabled one by default)
    #[arg(long)]
    log_param: Option<String>,
}

impl Args {
    fn build_config(&self) -> Result<ListenerConfig> {
        let mut cfg = ListenerConfig::default();

        if let Some(path) = &self.config {
            let sim = SimulatorToml::load(path).with_context(|| format!("loading {}", path.display()))?;
            cfg.group = sim.network.group;
            cfg.port = sim.network.port;
            cfg.spec = sim.record;
            cfg.hz = sim.simulation.hz;
            if !sim.parameters.is_empty() {
                cfg.params = sim.parameters;
            }
        }

        if let Some(path) = &self.params {
            let dat = ContainerFile::load(path).with_context(|| format!("loading {}", path.display()))?;
            info!("📂 {} parameters from {}", dat.parameters.len(), path.display());
            cfg.params = dat.parameters;
        }

        if let Some(group) = self.group {
            cfg.group = group;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        cfg.interface = self.iface;

        let mut spec = cfg.spec;
        if let Some(len) = self.packet_length {
            spec.packet_length = len;
        }
        if let Some(n) = self.packets_per_record {
            spec.packets_per_record = n;
        }
        if let Some(offset) = self.time_offset {
            spec.timestamp_byte_offset = offset;
        }
        cfg.spec = RecordSpec::normalized(spec);

        if let Some(hz) = self.hz {
            cfg.hz = hz;
        }
        if self.log_param.is_some() {
            cfg.log_param = self.log_param.clone();
        }
        cfg.idle_timeout = idle_timeout_from_secs(self.idle_timeout)?;

        cfg.validate()?;
        for issue in cfg.params.validate_layout(&cfg.spec) {
            warn!("Layout: {issue}");
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_listener=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = args.build_config()?;

    let mut receiver = MulticastReceiver::bind(cfg.group, cfg.port, cfg.interface)
        .await
        .with_context(|| format!("binding UDP port {}", cfg.port))?;

    let mut listener = Listener::new(&cfg)?
        .with_dat(&args.out_dat)
        .with_context(|| format!("creating {}", args.out_dat.display()))?
        .with_table(&args.out_txt)
        .with_context(|| format!("creating {}", args.out_txt.display()))?;

    info!(
        "🎧 Listening for {}×{}B records, logging `{}` to {}",
        cfg.spec.packets_per_record,
        cfg.spec.packet_length,
        listener.logged_parameter(),
        args.out_txt.display()
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let cause = run(&mut receiver, &mut listener, cfg.idle_timeout, shutdown).await?;
    match cause {
        StopCause::IdleTimeout => info!("⏱ No packets for {:?}, stopping", cfg.idle_timeout.unwrap_or_default()),
        StopCause::Interrupted => info!("🛑 Interrupted"),
    }

    let summary = listener.finish()?;
    let elapsed = summary.last_packet_at.map(|t| t - summary.started_at);
    info!(
        "✅ {} records captured to {} ({} packets, {} wrong size, {} incomplete records dropped{})",
        summary.records,
        args.out_dat.display(),
        summary.packets_accepted,
        summary.wrong_size,
        summary.incomplete_dropped,
        elapsed
            .map(|d| format!(", last packet after {:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_default()
    );
    Ok(())
}
