//! Scan progress events
//!
//! The orchestrator publishes typed events to a [`ProgressSink`] and never
//! waits on the consumer. [`BroadcastProgress`] buffers a fixed number of
//! events per subscriber; a subscriber that falls behind loses the oldest
//! ones and sees `RecvError::Lagged`.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::result::ScanResult;
use crate::core::{FailureKind, ScannerError};

/// Outcome of one symbol as reported in progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SymbolProgress {
    Scanned { contracts: usize },
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        scan_id: u64,
        total: usize,
    },
    /// `index` counts completions (1-based), in completion order
    SymbolCompleted {
        scan_id: u64,
        index: usize,
        total: usize,
        symbol: String,
        status: SymbolProgress,
    },
    Finished {
        scan_id: u64,
        result: Arc<ScanResult>,
    },
    Failed {
        scan_id: u64,
        error: ScannerError,
    },
}

impl ProgressEvent {
    pub fn scan_id(&self) -> u64 {
        match self {
            ProgressEvent::Started { scan_id, .. }
            | ProgressEvent::SymbolCompleted { scan_id, .. }
            | ProgressEvent::Finished { scan_id, .. }
            | ProgressEvent::Failed { scan_id, .. } => *scan_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Finished { .. } | ProgressEvent::Failed { .. })
    }
}

/// Receiver of progress events. Must not block.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn publish(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn publish(&self, _event: ProgressEvent) {}
}

/// Fan-out to any number of subscribers, drop-oldest on overflow
#[derive(Debug, Clone)]
pub struct BroadcastProgress {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for BroadcastProgress {
    fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}
