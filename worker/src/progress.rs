//! Bounded, ordered, terminal-aware progress reporting for a single delivery.
//!
//! Every record destined for the outgoing queue for one delivery - the initial `running`
//! marker, the handler's own progress updates, and the final terminal callback - passes
//! through the same [`ProgressReporter`]. That gives us ordering and the terminal guard for
//! free: once a terminal record has been queued, every later call (including a handler that
//! leaked its progress closure and calls it again after returning) is silently dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Notify;
use tracing::warn;

/// Whether a queued record carries a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Not terminal - either the initial marker or an intermediate progress update.
    None,
    /// The task completed successfully.
    Success,
    /// The task failed.
    Failure,
}

/// One record queued by the reporter, waiting to be turned into a [`crate::model::TaskCallback`]
/// and forwarded to the publisher.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    /// Progress value in `[0.0, 1.0]`, if one was reported.
    pub progress: Option<f64>,
    /// The handler's progress payload, or the terminal response, depending on `terminal`.
    pub response: Option<Value>,
    /// Whether this record is terminal, and if so, which way.
    pub terminal: Terminal,
}

struct Inner {
    buffer: Mutex<VecDeque<ProgressRecord>>,
    notify: Notify,
    terminal_queued: AtomicBool,
    capacity: usize,
}

/// Per-delivery progress reporter. Cheap to clone; every clone shares the same buffer, so a
/// handler can freely hand its handle to other tasks.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

impl ProgressReporter {
    /// Default capacity of the per-delivery buffer before oldest non-terminal reports are
    /// dropped to make room.
    pub const DEFAULT_CAPACITY: usize = 32;

    /// Creates a new, empty reporter with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                terminal_queued: AtomicBool::new(false),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Handler-facing progress report. Always non-terminal. Never blocks beyond a mutex
    /// acquisition, so it is safe to call from both synchronous and asynchronous handlers.
    pub fn report(&self, progress: Option<f64>, payload: Option<Value>) {
        let progress = progress.map(clamp_progress);
        self.push(ProgressRecord {
            progress,
            response: payload,
            terminal: Terminal::None,
        });
    }

    /// Suspending façade used by asynchronous handlers. Submission never actually suspends in
    /// this implementation, since the underlying push is a fast, bounded, non-blocking
    /// operation - but the async shape lets handlers `.await` it uniformly.
    pub async fn report_async(&self, progress: Option<f64>, payload: Option<Value>) {
        self.report(progress, payload);
    }

    /// Queues the initial `running` marker. Called by the dispatcher before invoking the
    /// handler.
    pub(crate) fn mark_running(&self) {
        self.push(ProgressRecord {
            progress: None,
            response: None,
            terminal: Terminal::None,
        });
    }

    /// Queues the terminal record. Called by the dispatcher once the handler has completed.
    pub(crate) fn mark_terminal(&self, terminal: Terminal, response: Option<Value>) {
        debug_assert_ne!(terminal, Terminal::None);
        self.push(ProgressRecord {
            progress: None,
            response,
            terminal,
        });
    }

    /// Latches the terminal guard without queuing a record, so that a handler still running
    /// past the drain grace deadline cannot publish anything once its delivery has already
    /// been finalized by force.
    pub(crate) fn force_close(&self) {
        self.inner.terminal_queued.store(true, Ordering::Release);
    }

    fn push(&self, record: ProgressRecord) {
        if self.inner.terminal_queued.load(Ordering::Acquire) {
            return;
        }

        let mut buffer = self.inner.buffer.lock().expect("progress buffer poisoned");
        if record.terminal != Terminal::None {
            self.inner.terminal_queued.store(true, Ordering::Release);
        } else if buffer.len() >= self.inner.capacity {
            let dropped = buffer.pop_front();
            debug_assert!(dropped.map(|r| r.terminal == Terminal::None).unwrap_or(true));
            warn!("progress buffer full, dropping oldest non-terminal report");
        }
        buffer.push_back(record);
        drop(buffer);

        self.inner.notify.notify_one();
    }

    /// Waits for and pops the next queued record. The caller drives this in a loop until it
    /// receives a record whose `terminal` is not [`Terminal::None`].
    pub(crate) async fn next(&self) -> ProgressRecord {
        loop {
            if let Some(record) = self.pop() {
                return record;
            }
            self.inner.notify.notified().await;
        }
    }

    fn pop(&self) -> Option<ProgressRecord> {
        self.inner
            .buffer
            .lock()
            .expect("progress buffer poisoned")
            .pop_front()
    }
}

fn clamp_progress(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        warn!("progress value {p} out of range [0.0, 1.0], clamping");
        p.clamp(0.0, 1.0)
    } else {
        p
    }
}
