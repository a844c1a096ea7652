//! Progress reporting for capture and encode runs.
//!
//! A run owns one [`ProgressReporter`]. Phases receive *scopes* of it that map their own
//! `0..=1` fraction into a sub-range of the run's percent. Whatever the phases report, the
//! stream a sink sees is non-decreasing and only reaches 100 through
//! [`ProgressReporter::complete`]; failures are a separate [`ProgressUpdate::Failed`] event.

use std::{cell::Cell, sync::Arc};

use parking_lot::ReentrantMutex;
use tokio::sync::mpsc;

/// Highest percent a non-terminal update can carry.
const MAX_RUNNING_PERCENT: f64 = 99.0;

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ProgressEvent {
    /// In `[0, 100]`.
    pub percent: f64,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    Progress(ProgressEvent),
    Failed { message: String },
}

impl ProgressUpdate {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Progress(ev) => Some(ev.percent),
            Self::Failed { .. } => None,
        }
    }
}

/// Receives a run's updates in order. A sink may report through the same reporter from
/// inside `on_update`; the nested update is delivered before the outer call returns.
pub trait ProgressSink: Send + Sync {
    fn on_update(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn on_update(&self, update: ProgressUpdate) {
        self(update)
    }
}

struct ChannelSink(mpsc::UnboundedSender<ProgressUpdate>);

impl ProgressSink for ChannelSink {
    fn on_update(&self, update: ProgressUpdate) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.0.send(update);
    }
}

struct Shared {
    sink: Box<dyn ProgressSink>,
    /// Serializes delivery across threads; re-entrant so a sink can report from its callback.
    last: ReentrantMutex<Cell<f64>>,
}

impl Shared {
    fn emit(&self, percent: f64, status: &str) -> f64 {
        let last = self.last.lock();
        let percent = percent.max(last.get());
        last.set(percent);
        self.sink.on_update(ProgressUpdate::Progress(ProgressEvent {
            percent,
            status: status.to_string(),
        }));
        percent
    }

    fn fail(&self, message: &str) {
        let _order = self.last.lock();
        self.sink.on_update(ProgressUpdate::Failed {
            message: message.to_string(),
        });
    }
}

/// Monotonic progress emitter, optionally scoped to a sub-range of the run.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<Shared>,
    from: f64,
    to: f64,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    pub fn new(sink: impl ProgressSink + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink: Box::new(sink),
                last: ReentrantMutex::new(Cell::new(0.0)),
            }),
            from: 0.0,
            to: 100.0,
        }
    }

    /// Reporter whose updates go nowhere.
    pub fn discard() -> Self {
        Self::new(|_: ProgressUpdate| {})
    }

    /// Reporter plus the receiving end of its update stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(ChannelSink(tx)), rx)
    }

    /// Child reporter covering `[start, end]` (fractions of this reporter's range).
    pub fn scope(&self, start: f64, end: f64) -> Self {
        let span = self.to - self.from;
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(start, 1.0);
        Self {
            shared: Arc::clone(&self.shared),
            from: self.from + span * start,
            to: self.from + span * end,
        }
    }

    /// Report `fraction` of this scope done. Never emits 100.
    pub fn report(&self, fraction: f64, status: &str) -> f64 {
        let pct = self.from + (self.to - self.from) * fraction.clamp(0.0, 1.0);
        self.shared.emit(pct.min(MAX_RUNNING_PERCENT), status)
    }

    /// Mark this scope finished. On the root reporter this is the terminal 100% event.
    pub fn complete(&self, status: &str) -> f64 {
        self.shared.emit(self.to, status)
    }

    pub fn fail(&self, message: &str) {
        self.shared.fail(message);
    }
}

/// Spreads at least `min_ticks` evenly spaced progress ticks over `total` work units, so
/// short runs still produce a useful number of updates.
#[derive(Clone, Debug)]
pub struct Ticker {
    total: usize,
    ticks: usize,
    emitted: usize,
}

impl Ticker {
    pub fn new(total: usize, min_ticks: usize) -> Self {
        Self {
            total: total.max(1),
            ticks: total.max(min_ticks).max(1),
            emitted: 0,
        }
    }

    /// Fractions (in `(0, 1]`) of the ticks that became due now that `done` units finished.
    pub fn advance(&mut self, done: usize) -> Vec<f64> {
        let due = (done.min(self.total) * self.ticks) / self.total;
        let start = self.emitted;
        self.emitted = self.emitted.max(due);
        (start + 1..=due)
            .map(|t| t as f64 / self.ticks as f64)
            .collect()
    }
}

#[cfg(test)]
#[path = "../tests/unit/progress.rs"]
mod tests;
