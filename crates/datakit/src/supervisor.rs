//! Periodic timeout sweep over running parse and deduplication tasks.

use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::clock::Clock;
use crate::dedup::DedupManager;
use crate::error::WorkerError;
use crate::parse::ParseTaskTracker;
use crate::sync::{read_lock, write_lock};

/// Ids of the tasks failed by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub parse_tasks: Vec<String>,
    pub dedup_tasks: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.parse_tasks.is_empty() && self.dedup_tasks.is_empty()
    }
}

#[derive(Clone)]
struct Sweeper {
    parse: ParseTaskTracker,
    dedup: DedupManager,
    clock: Arc<dyn Clock>,
    timeout: chrono::Duration,
}

impl Sweeper {
    fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let report = SweepReport {
            parse_tasks: self.parse.sweep_timeouts(now, self.timeout),
            dedup_tasks: self.dedup.sweep_timeouts(now, self.timeout),
        };
        if !report.is_empty() {
            log::warn!(
                "Timeout sweep failed {} parse and {} deduplication task(s)",
                report.parse_tasks.len(),
                report.dedup_tasks.len()
            );
        }
        report
    }
}

/// Fails tasks stuck in `running` longer than the configured timeout.
pub struct TimeoutSupervisor {
    sweeper: Sweeper,
    interval: Duration,
    stop_tx: RwLock<Option<Sender<()>>>,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl TimeoutSupervisor {
    pub fn new(
        parse: ParseTaskTracker,
        dedup: DedupManager,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        Self {
            sweeper: Sweeper {
                parse,
                dedup,
                clock,
                timeout,
            },
            interval,
            stop_tx: RwLock::new(None),
            handle: RwLock::new(None),
        }
    }

    /// Runs one sweep on the calling thread.
    pub fn sweep_once(&self) -> SweepReport {
        self.sweeper.sweep()
    }

    /// Starts sweeping every `interval` on a background thread. Does nothing if
    /// already started.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut handle_slot = write_lock(&self.handle, "Supervisor handle");
        if handle_slot.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(self.interval);
        let sweeper = self.sweeper.clone();

        let handle = std::thread::Builder::new()
            .name("datakit-supervisor".to_string())
            .spawn(move || {
                log::debug!("Timeout supervisor started");
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            sweeper.sweep();
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::debug!("Timeout supervisor stopped");
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        *write_lock(&self.stop_tx, "Supervisor stop") = Some(stop_tx);
        *handle_slot = Some(handle);
        Ok(())
    }

    /// Stops the background thread and waits for it to exit.
    pub fn stop(&self) {
        // Dropping the sender also wakes the loop.
        if let Some(stop_tx) = write_lock(&self.stop_tx, "Supervisor stop").take() {
            let _ = stop_tx.send(());
        }
        let handle = write_lock(&self.handle, "Supervisor handle").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Timeout supervisor thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        read_lock(&self.handle, "Supervisor handle").is_some()
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
