//! # listener
//!
//! Receive loop: datagrams → [`RecordAssembler`] → [`Decoder`] → capture
//! files. Recv errors are logged and never end the loop; capture write
//! errors do, since there is nothing useful left to do without the output.

use std::fs::File;
use std::future::Future;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use telemetry_types::{DecodedRecord, Decoder, RecordSpec};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblerStats, RecordAssembler};
use crate::capture::{DatCapture, ParameterTable};
use crate::config::{ListenerConfig, ListenerError};
use crate::multicast_rx::MulticastReceiver;

type CaptureFile = BufWriter<File>;

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    IdleTimeout,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerSummary {
    pub records: u64,
    pub packets_accepted: u64,
    pub wrong_size: u64,
    pub incomplete_dropped: u64,
    pub started_at: DateTime<Utc>,
    pub last_packet_at: Option<DateTime<Utc>>,
}

pub struct Listener {
    spec: RecordSpec,
    assembler: RecordAssembler,
    decoder: Decoder,
    log_param: String,
    dat: Option<DatCapture<CaptureFile>>,
    table: Option<ParameterTable<CaptureFile>>,
    started_at: DateTime<Utc>,
    last_packet_at: Option<DateTime<Utc>>,
}

impl Listener {
    pub fn new(cfg: &ListenerConfig) -> Result<Self, ListenerError> {
        cfg.validate()?;
        Ok(Self {
            spec: cfg.spec,
            assembler: RecordAssembler::new(cfg.spec),
            decoder: Decoder::new(cfg.params.clone(), cfg.spec, 1.0 / cfg.hz),
            log_param: cfg.logged_parameter()?,
            dat: None,
            table: None,
            started_at: Utc::now(),
            last_packet_at: None,
        })
    }

    /// Write complete records to a `.dat` capture (overwritten).
    pub fn with_dat(mut self, path: impl AsRef<Path>) -> Result<Self, ListenerError> {
        self.dat = Some(DatCapture::create(path, self.decoder.params())?);
        Ok(self)
    }

    /// Write the logged parameter's table (overwritten).
    pub fn with_table(mut self, path: impl AsRef<Path>) -> Result<Self, ListenerError> {
        self.table = Some(ParameterTable::create(path)?);
        Ok(self)
    }

    pub fn logged_parameter(&self) -> &str {
        &self.log_param
    }

    pub fn stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    /// Whether a datagram of this size can belong to a record.
    pub fn accepts(&self, len: usize) -> bool {
        len == self.spec.packet_length
    }

    /// Feed one datagram. Returns the decoded record when it completes one.
    pub fn handle_packet(&mut self, packet: Vec<u8>) -> Result<Option<DecodedRecord>, ListenerError> {
        if self.accepts(packet.len()) {
            self.last_packet_at = Some(Utc::now());
        }
        let Some(record) = self.assembler.push(packet) else {
            return Ok(None);
        };

        if let Some(dat) = self.dat.as_mut() {
            dat.append(&record.to_bytes())?;
        }

        let decoded = self.decoder.decode_packets(&record.packets);
        let n = self.assembler.stats().records;
        if decoded.missing_count() > 0 {
            debug!("Record {n}: {} parameters missing", decoded.missing_count());
        }

        if let Some(value) = decoded.get(&self.log_param) {
            match self.table.as_mut() {
                Some(table) => {
                    let line = table.write_row(record.record_time, value)?;
                    info!("{line}");
                }
                None => info!("📥 record {n} t={:.3} {}={:?}", record.record_time, self.log_param, value.values()),
            }
        }
        Ok(Some(decoded))
    }

    /// Drop any partial record, flush outputs and report.
    pub fn finish(mut self) -> Result<ListenerSummary, ListenerError> {
        self.assembler.flush();
        if let Some(dat) = self.dat.take() {
            dat.finish()?;
        }
        if let Some(table) = self.table.take() {
            table.finish()?;
        }
        let stats = self.assembler.stats();
        Ok(ListenerSummary {
            records: stats.records,
            packets_accepted: stats.packets_accepted,
            wrong_size: stats.wrong_size,
            incomplete_dropped: stats.incomplete_dropped,
            started_at: self.started_at,
            last_packet_at: self.last_packet_at,
        })
    }
}

/// Receive until `shutdown` resolves or no packet of the right size arrives
/// for `idle_timeout`.
pub async fn run(
    receiver: &mut MulticastReceiver,
    listener: &mut Listener,
    idle_timeout: Option<Duration>,
    shutdown: impl Future<Output = ()>,
) -> Result<StopCause, ListenerError> {
    tokio::pin!(shutdown);
    let mut deadline = idle_timeout.map(|d| Instant::now() + d);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => return Ok(StopCause::Interrupted),
            _ = sleep_until(deadline) => return Ok(StopCause::IdleTimeout),
            next = receiver.recv() => next,
        };

        match next {
            Ok((data, src)) => {
                if listener.accepts(data.len()) {
                    deadline = idle_timeout.map(|d| Instant::now() + d);
                } else {
                    debug!("UDP: {}B datagram from {src} ignored", data.len());
                }
                listener.handle_packet(data)?;
            }
            Err(e) => warn!("UDP: recv error: {e}"),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
