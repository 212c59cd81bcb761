//! Lifecycle probes for worker and scheduler processes
//!
//! The host runtime exposes lifecycle callbacks; the observers here implement
//! them to maintain the marker files the probe evaluator reads. The process
//! role is fixed by the observer you construct: a worker process gets a
//! [`WorkerPulse`], a scheduler process a [`BeatPulse`]. There is no
//! process-global mode flag.

use crate::beacon::Beacon;
use crate::config::ProbeSettings;
use crate::error::Result;
use crate::sonar::SonarResponder;

/// Callbacks a host runtime invokes on its lifecycle events
///
/// Every method defaults to a no-op, so an observer only implements the
/// events that matter for its role.
pub trait RuntimeObserver {
    /// The process started its event loop
    fn on_started(&mut self) -> Result<()> {
        Ok(())
    }

    /// One tick of the event loop timer
    ///
    /// Expected at the configured probe frequency for as long as the loop is
    /// alive.
    fn on_tick(&mut self) -> Result<()> {
        Ok(())
    }

    /// The process established its broker connection and accepts work
    fn on_ready(&mut self) -> Result<()> {
        Ok(())
    }

    /// A scheduled task was dispatched successfully
    fn on_task_dispatched(&mut self) -> Result<()> {
        Ok(())
    }

    /// The process is shutting down
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Marker maintenance for a worker process
///
/// Touches the event loop liveness marker on start and on every tick,
/// creates the readiness marker once the worker accepts work, and removes
/// both on shutdown. Unless disabled, a [`SonarResponder`] is started
/// alongside the readiness marker so the worker answers ping roundtrips.
pub struct WorkerPulse {
    liveness: Beacon,
    readiness: Beacon,
    broker_url: String,
    worker_name: String,
    responder: Option<SonarResponder>,
    answer_pings: bool,
}

impl WorkerPulse {
    /// Create the observer for a worker process
    pub fn new(settings: &ProbeSettings) -> Self {
        Self {
            liveness: Beacon::new(&settings.worker_liveness_file),
            readiness: Beacon::new(&settings.worker_readiness_file),
            broker_url: settings.broker_url.clone(),
            worker_name: settings.worker_name.clone(),
            responder: None,
            answer_pings: true,
        }
    }

    /// Do not answer pings (for hosts with their own control plane)
    pub fn without_ping_responder(mut self) -> Self {
        self.answer_pings = false;
        self
    }

    /// Whether the ping responder is currently running
    pub fn is_answering_pings(&self) -> bool {
        self.responder.is_some()
    }
}

impl RuntimeObserver for WorkerPulse {
    fn on_started(&mut self) -> Result<()> {
        self.liveness.touch()
    }

    fn on_tick(&mut self) -> Result<()> {
        self.liveness.touch()
    }

    fn on_ready(&mut self) -> Result<()> {
        self.readiness.touch()?;
        if self.answer_pings && self.responder.is_none() {
            self.responder = Some(SonarResponder::spawn(&self.broker_url, &self.worker_name)?);
        }
        tracing::info!(worker = %self.worker_name, "worker_ready");
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<()> {
        tracing::info!(worker = %self.worker_name, "worker_shutdown");
        if let Some(responder) = self.responder.as_mut() {
            responder.stop();
        }
        self.responder = None;
        self.liveness.remove()?;
        self.readiness.remove()
    }
}

/// Marker maintenance for a scheduler (beat) process
///
/// The liveness marker is touched on every successfully dispatched task, so
/// its expected refresh cadence equals the shortest configured schedule
/// interval.
pub struct BeatPulse {
    liveness: Beacon,
}

impl BeatPulse {
    /// Create the observer for a scheduler process
    pub fn new(settings: &ProbeSettings) -> Self {
        Self {
            liveness: Beacon::new(&settings.beat_liveness_file),
        }
    }
}

impl RuntimeObserver for BeatPulse {
    fn on_task_dispatched(&mut self) -> Result<()> {
        tracing::debug!("beat_task_published");
        self.liveness.touch()
    }

    fn on_shutdown(&mut self) -> Result<()> {
        self.liveness.remove()
    }
}
