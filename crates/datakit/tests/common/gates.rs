//! Test doubles that block inside a task until a gate opens.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use datakit::config::DedupParams;
use datakit::dedup::{DedupObserver, DedupOutcome, Deduplicator, JaccardDeduplicator, QaItem};
use datakit::error::{DedupError, ParseError};
use datakit::parser::{DocumentFormat, ParseObserver, ParsedContent, Parser};

/// A shared open/closed switch.
#[derive(Clone, Default)]
pub struct Gate {
    open: Arc<AtomicBool>,
    waiting: Arc<AtomicUsize>,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        let gate = Self::default();
        gate.open.store(open, Ordering::SeqCst);
        gate
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of callers currently blocked on the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Blocks until the gate opens, calling `poll` every few milliseconds.
    /// An error from `poll` ends the wait early.
    fn wait<E>(&self, mut poll: impl FnMut() -> Result<(), E>) -> Result<(), E> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let result = loop {
            if self.is_open() {
                break Ok(());
            }
            if let Err(e) = poll() {
                break Err(e);
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Plain-text parser that reports 10%, waits for its gate, then reports 60%.
pub struct GatedParser {
    gate: Gate,
}

impl GatedParser {
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }
}

impl Parser for GatedParser {
    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Text
    }

    fn parse(
        &self,
        bytes: &[u8],
        observer: &dyn ParseObserver,
    ) -> Result<ParsedContent, ParseError> {
        observer.progress(10)?;
        self.gate.wait(|| observer.progress(10))?;
        observer.progress(60)?;

        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| ParseError::InvalidEncoding(e.to_string()))?;
        let units = text.lines().count();
        Ok(ParsedContent {
            text,
            format: DocumentFormat::Text,
            units,
        })
    }
}

/// Jaccard deduplication that first waits for its gate.
pub struct GatedDeduplicator {
    gate: Gate,
    inner: JaccardDeduplicator,
}

impl GatedDeduplicator {
    pub fn new(gate: Gate) -> Self {
        Self {
            gate,
            inner: JaccardDeduplicator::new(),
        }
    }
}

impl Deduplicator for GatedDeduplicator {
    fn deduplicate(
        &self,
        items: Vec<QaItem>,
        params: &DedupParams,
        observer: &dyn DedupObserver,
    ) -> Result<DedupOutcome, DedupError> {
        observer.progress(5)?;
        self.gate.wait(|| observer.progress(5))?;
        self.inner.deduplicate(items, params, observer)
    }
}
