//! Broadcasting of task log appends for live tailing.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::logs::LogEntry;

#[derive(Clone)]
pub struct LogBroadcaster {
    sender: Arc<broadcast::Sender<LogEntry>>,
}

impl LogBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, entry: LogEntry) {
        let _ = self.sender.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}
