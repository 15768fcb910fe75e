//! control.rs — Pause gate and shutdown signal shared by the seeder and sender.
//!
//! Both are thin `watch` wrappers. Tasks check them between units of work,
//! never in the middle of a record.

use tokio::sync::watch;

/// Owning side of a pause gate.
#[derive(Debug)]
pub struct PauseSwitch {
    tx: watch::Sender<bool>,
}

impl Default for PauseSwitch {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PauseSwitch {
    pub fn new(paused: bool) -> Self {
        let (tx, _) = watch::channel(paused);
        Self { tx }
    }

    /// Idempotent.
    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    /// Idempotent.
    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn gate(&self) -> PauseGate {
        PauseGate { rx: self.tx.subscribe() }
    }
}

/// Task-side view of a [`PauseSwitch`].
#[derive(Debug, Clone)]
pub struct PauseGate {
    rx: watch::Receiver<bool>,
}

impl PauseGate {
    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves immediately when not paused. A dropped switch counts as resumed.
    pub async fn wait_resumed(&mut self) {
        let _ = self.rx.wait_for(|paused| !*paused).await;
    }
}

/// Owning side of a one-shot shutdown flag.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }
}

impl Shutdown {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the owning [`Shutdown`] is gone.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
