//! seeder.rs — Producer side of the record queue
//!
//! One record per tick at `hz`, from `start_time` to `end_time` inclusive.
//! Publishing waits for queue capacity, which is how a slow or paused sender
//! throttles the producer. Rate changes take effect at the next tick.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::control::{PauseGate, PauseSwitch, Shutdown, ShutdownSignal};
use crate::events::{EventBus, LogLevel, SimEvent, TaskKind};
use crate::seeding::SeedingEngine;
use crate::sender::OutboundRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct SeederConfig {
    pub start_time: f64,
    pub end_time: f64,
    pub hz: f64,
    pub progress_every: u64,
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 10.0,
            hz: 2.0,
            progress_every: 20,
        }
    }
}

/// The rate must give a tick period a timer can represent: finite, non-zero.
pub fn validate_hz(hz: f64) -> Result<(), ConfigError> {
    try_period(hz).map(|_| ())
}

fn try_period(hz: f64) -> Result<Duration, ConfigError> {
    if !(hz.is_finite() && hz > 0.0) {
        return Err(ConfigError::InvalidRate(hz));
    }
    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(ConfigError::InvalidRate(hz)),
    }
}

impl SeederConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_hz(self.hz)?;
        let ordered = self.start_time.is_finite() && self.end_time.is_finite() && self.start_time <= self.end_time;
        if !ordered {
            return Err(ConfigError::InvalidWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Passed `end_time`
    Completed,
    /// `stop` was called
    Cancelled,
    /// Sender went away
    QueueClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeederState {
    Idle,
    Running,
    Paused,
    Stopped(StopReason),
}

impl SeederState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped(StopReason::Completed) => "completed",
            Self::Stopped(StopReason::Cancelled) => "cancelled",
            Self::Stopped(StopReason::QueueClosed) => "queue_closed",
        }
    }
}

pub struct Seeder {
    config: SeederConfig,
    engine: Arc<SeedingEngine>,
    events: EventBus,
}

impl Seeder {
    pub fn new(config: SeederConfig, engine: Arc<SeedingEngine>, events: EventBus) -> Self {
        Self { config, engine, events }
    }

    /// Validate and start producing. Nothing is queued if validation fails.
    pub fn spawn(self, queue: mpsc::Sender<OutboundRecord>) -> Result<SeederHandle, ConfigError> {
        self.config.validate()?;
        self.engine.spec().validate()?;

        let pause = PauseSwitch::default();
        let shutdown = Shutdown::default();
        let (rate_tx, rate_rx) = watch::channel(self.config.hz);
        let (state_tx, state_rx) = watch::channel(SeederState::Idle);

        let task = tokio::spawn(run(RunContext {
            config: self.config,
            engine: self.engine,
            events: self.events,
            queue,
            gate: pause.gate(),
            shutdown: shutdown.signal(),
            rate: rate_rx,
            state: state_tx,
        }));

        Ok(SeederHandle {
            pause,
            shutdown,
            rate: rate_tx,
            state: state_rx,
            task,
        })
    }
}

pub struct SeederHandle {
    pause: PauseSwitch,
    shutdown: Shutdown,
    rate: watch::Sender<f64>,
    state: watch::Receiver<SeederState>,
    task: JoinHandle<()>,
}

impl SeederHandle {
    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Applied at the next tick boundary; an in-flight record keeps its rate.
    pub fn set_hz(&self, hz: f64) -> Result<(), ConfigError> {
        validate_hz(hz)?;
        self.rate.send_replace(hz);
        Ok(())
    }

    pub fn hz(&self) -> f64 {
        *self.rate.borrow()
    }

    pub fn state(&self) -> SeederState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SeederState> {
        self.state.clone()
    }

    /// Resolves once the seeder has stopped for any reason.
    pub async fn finished(&self) -> SeederState {
        let mut rx = self.state.clone();
        let result = rx.wait_for(SeederState::is_stopped).await.map(|s| *s);
        result.unwrap_or(SeederState::Stopped(StopReason::Cancelled))
    }

    /// Signal shutdown and join. No record is queued after this returns.
    pub async fn stop(self) -> SeederState {
        self.shutdown.trigger();
        self.join().await
    }

    /// Join without signalling; returns once the run ends on its own.
    pub async fn join(self) -> SeederState {
        if let Err(e) = self.task.await {
            warn!("Seeder: task ended abnormally: {e}");
        }
        match *self.state.borrow() {
            s @ SeederState::Stopped(_) => s,
            _ => SeederState::Stopped(StopReason::Cancelled),
        }
    }
}

// ── Loop ──────────────────────────────────────────────────────────────────────

struct RunContext {
    config: SeederConfig,
    engine: Arc<SeedingEngine>,
    events: EventBus,
    queue: mpsc::Sender<OutboundRecord>,
    gate: PauseGate,
    shutdown: ShutdownSignal,
    rate: watch::Receiver<f64>,
    state: watch::Sender<SeederState>,
}

impl RunContext {
    fn set_state(&self, state: SeederState) {
        if *self.state.borrow() == state {
            return;
        }
        self.state.send_replace(state);
        self.events.publish(SimEvent::StateChanged {
            task: TaskKind::Seeder,
            state: state.label().to_string(),
        });
    }
}

/// `hz` has already passed [`validate_hz`]; the fallback is never used.
fn period(hz: f64) -> Duration {
    try_period(hz).unwrap_or(Duration::from_secs(1))
}

/// First tick after one full period.
fn ticker_from_next_period(hz: f64) -> Interval {
    let mut ticker = interval_at(Instant::now() + period(hz), period(hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run(mut ctx: RunContext) {
    let mut hz = *ctx.rate.borrow_and_update();
    let mut ticker = interval(period(hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut current_time = ctx.config.start_time;
    let mut record_index: u64 = 0;

    info!(
        "⏱ Seeder running at {hz} Hz ({}ms period), t={}..{}",
        period(hz).as_millis(),
        ctx.config.start_time,
        ctx.config.end_time
    );
    ctx.set_state(SeederState::Running);

    let reason = loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.triggered() => break StopReason::Cancelled,
            _ = ticker.tick() => {}
        }

        if ctx.rate.has_changed().unwrap_or(false) {
            let new_hz = *ctx.rate.borrow_and_update();
            if new_hz != hz {
                hz = new_hz;
                ticker = ticker_from_next_period(hz);
                info!("⚡ Seeder rate set to {hz} Hz");
                ctx.events.log(LogLevel::Info, format!("rate set to {hz} Hz"));
            }
        }

        if ctx.gate.is_paused() {
            ctx.set_state(SeederState::Paused);
            continue;
        }
        ctx.set_state(SeederState::Running);

        if current_time > ctx.config.end_time {
            break StopReason::Completed;
        }

        let record_interval = 1.0 / hz;
        let seeded = ctx.engine.seed(current_time, record_index, record_interval, &ctx.events);
        let record = OutboundRecord {
            record_index,
            record_time: current_time,
            packets: seeded.buffer.materialize(),
        };
        let packet_count = record.packets.len();

        tokio::select! {
            biased;
            _ = ctx.shutdown.triggered() => break StopReason::Cancelled,
            sent = ctx.queue.send(record) => {
                if sent.is_err() {
                    break StopReason::QueueClosed;
                }
            }
        }

        ctx.events.publish(SimEvent::RecordReady {
            record_index,
            record_time: current_time,
            packet_count,
        });

        let every = ctx.config.progress_every;
        if every > 0 && record_index % every == 0 {
            info!("📦 record={record_index} t={current_time:.3}s packets={packet_count}");
        }

        current_time += record_interval;
        record_index += 1;
    };

    match reason {
        StopReason::QueueClosed => warn!("Seeder: queue closed after {record_index} records"),
        _ => info!("🏁 Seeder stopped ({}) after {record_index} records", reason_label(reason)),
    }
    ctx.events
        .log(LogLevel::Info, format!("seeder stopped after {record_index} records"));
    ctx.set_state(SeederState::Stopped(reason));
}

fn reason_label(reason: StopReason) -> &'static str {
    SeederState::Stopped(reason).label()
}
