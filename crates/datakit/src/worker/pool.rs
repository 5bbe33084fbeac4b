use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::task::panic_message;

/// A unit of work executed by exactly one worker thread.
pub struct Work {
    label: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl Work {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }
}

/// Flags every worker thread reads.
#[derive(Default)]
struct PoolState {
    stopping: AtomicBool,
    busy: AtomicUsize,
}

impl PoolState {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Fixed-size thread pool fed through a channel.
///
/// Work submitted while every worker is busy waits in the channel. A panic
/// inside a unit of work is caught and logged; the worker keeps running.
pub struct WorkerPool {
    queue: Sender<Work>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<PoolState>,
    size: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, WorkerError> {
        let size = threads.max(1);
        let (queue, inbox) = unbounded::<Work>();
        let state = Arc::new(PoolState::default());

        let handles = (0..size)
            .map(|index| {
                let inbox = inbox.clone();
                let state = Arc::clone(&state);
                thread::Builder::new()
                    .name(format!("datakit-worker-{}", index))
                    .spawn(move || worker_loop(index, inbox, state))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                state.stopping.store(true, Ordering::SeqCst);
                WorkerError::SpawnFailed(e.to_string())
            })?;

        info!("Worker pool ready with {} threads", size);

        Ok(Self {
            queue,
            threads: Mutex::new(handles),
            state,
            size,
        })
    }

    pub fn submit(&self, work: Work) -> Result<(), WorkerError> {
        if self.state.is_stopping() {
            return Err(WorkerError::ChannelClosed);
        }
        self.queue.send(work).map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Units of work waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Units of work currently executing.
    pub fn busy(&self) -> usize {
        self.state.busy.load(Ordering::SeqCst)
    }

    /// Stops accepting work. Threads exit once their current unit finishes.
    pub fn shutdown(&self) {
        if !self.state.stopping.swap(true, Ordering::SeqCst) {
            info!("Worker pool stopping; {} units still queued", self.queued());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.is_stopping()
    }

    /// Signals shutdown and waits for every worker to exit. Work still queued is dropped.
    pub fn join(&self) {
        self.shutdown();

        let handles: Vec<JoinHandle<()>> = self
            .threads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        let total = handles.len();

        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("{} exited by panic", name);
            }
        }

        debug!("Joined {} worker threads", total);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.state.stopping.store(true, Ordering::SeqCst);
    }
}

fn worker_loop(index: usize, inbox: Receiver<Work>, state: Arc<PoolState>) {
    while !state.is_stopping() {
        let Work { label, run } = match inbox.recv_timeout(Duration::from_millis(100)) {
            Ok(work) => work,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        debug!("datakit-worker-{} picked up {}", index, label);
        state.busy.fetch_add(1, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(run));
        state.busy.fetch_sub(1, Ordering::SeqCst);

        if let Err(payload) = outcome {
            error!(
                "{} panicked on datakit-worker-{}: {}",
                label,
                index,
                panic_message(payload.as_ref())
            );
        }
    }

    debug!("datakit-worker-{} exiting", index);
}
