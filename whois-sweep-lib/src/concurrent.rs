//! Shared state of a streaming run.
//!
//! A run owns three pieces of shared mutable state: the job queue workers
//! pull from, the status board holding one entry per submitted domain, and
//! the event channel the board feeds. [`ScanControl`] bundles them with the
//! run state (running, paused, cancelled) and is what callers use to steer a
//! run; [`ScanHandle`] adds the receiving end of the event channel.

use crate::types::{CheckResult, CheckStatus, Progress};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Cancelled,
}

/// One settled domain, as delivered to the consumer of a streaming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// The domain and its terminal status
    pub result: CheckResult,

    /// Position of the domain in the submitted list
    pub index: usize,

    /// Counters after this result was recorded
    pub progress: Progress,
}

/// FIFO of `(submission index, domain)` pairs not yet taken by a worker.
struct JobQueue {
    jobs: Mutex<VecDeque<(usize, String)>>,
}

impl JobQueue {
    fn new(domains: &[String]) -> Self {
        Self {
            jobs: Mutex::new(domains.iter().cloned().enumerate().collect()),
        }
    }

    fn pop(&self) -> Option<(usize, String)> {
        lock(&self.jobs).pop_front()
    }

    fn clear(&self) {
        lock(&self.jobs).clear();
    }
}

struct BoardInner {
    entries: Vec<CheckResult>,
    completed: usize,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl BoardInner {
    fn progress(&self) -> Progress {
        Progress {
            completed: self.completed,
            total: self.entries.len(),
        }
    }

    fn settle(&mut self, index: usize, status: CheckStatus) {
        self.entries[index].status = status;
        self.completed += 1;

        let event = ScanEvent {
            result: self.entries[index].clone(),
            index,
            progress: self.progress(),
        };
        if let Some(events) = &self.events {
            // A consumer that went away simply stops receiving.
            let _ = events.send(event);
        }

        if self.completed == self.entries.len() {
            self.events = None;
        }
    }
}

/// Per-domain status table in submission order.
///
/// Events are sent while the board lock is held, so consumers observe
/// completed counts in strictly increasing order.
struct StatusBoard {
    inner: Mutex<BoardInner>,
}

impl StatusBoard {
    fn new(domains: &[String], events: mpsc::UnboundedSender<ScanEvent>) -> Self {
        let entries: Vec<CheckResult> = domains.iter().map(CheckResult::pending).collect();
        let events = if entries.is_empty() { None } else { Some(events) };

        Self {
            inner: Mutex::new(BoardInner {
                entries,
                completed: 0,
                events,
            }),
        }
    }

    /// Store a terminal status. Entries that already settled are left alone.
    fn record(&self, index: usize, status: CheckStatus) -> bool {
        let mut inner = lock(&self.inner);
        match inner.entries.get(index) {
            Some(entry) if !entry.status.is_terminal() => {
                inner.settle(index, status);
                true
            }
            _ => false,
        }
    }

    /// Mark every entry that has not settled yet as cancelled.
    fn cancel_remaining(&self) -> usize {
        let mut inner = lock(&self.inner);
        let pending: Vec<usize> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.status.is_terminal())
            .map(|(index, _)| index)
            .collect();

        for &index in &pending {
            inner.settle(index, CheckStatus::Cancelled);
        }
        pending.len()
    }

    fn snapshot(&self) -> Vec<CheckResult> {
        lock(&self.inner).entries.clone()
    }

    fn progress(&self) -> Progress {
        lock(&self.inner).progress()
    }
}

struct RunShared {
    state: watch::Sender<RunState>,
    queue: JobQueue,
    board: StatusBoard,
}

/// Steering handle for a streaming run.
///
/// Cheap to clone; all clones act on the same run.
#[derive(Clone)]
pub struct ScanControl {
    shared: Arc<RunShared>,
}

impl ScanControl {
    pub(crate) fn new(domains: &[String]) -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(RunState::Running);

        let control = Self {
            shared: Arc::new(RunShared {
                state,
                queue: JobQueue::new(domains),
                board: StatusBoard::new(domains, events_tx),
            }),
        };
        (control, events_rx)
    }

    /// Hold workers at their next attempt boundary.
    ///
    /// Lookups already on the wire finish normally.
    pub fn pause(&self) {
        let paused = self.shared.state.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Paused;
                true
            } else {
                false
            }
        });
        if paused {
            tracing::info!("scan paused");
        }
    }

    /// Wake workers held by [`pause`](Self::pause).
    pub fn resume(&self) {
        let resumed = self.shared.state.send_if_modified(|state| {
            if *state == RunState::Paused {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
        if resumed {
            tracing::info!("scan resumed");
        }
    }

    /// Stop the run.
    ///
    /// Undispatched domains are dropped from the queue and every domain
    /// without a terminal status is marked `Cancelled` right away. Results
    /// of lookups still in flight are discarded when they arrive.
    pub fn cancel(&self) {
        let previous = self.shared.state.send_replace(RunState::Cancelled);
        if previous == RunState::Cancelled {
            return;
        }

        self.shared.queue.clear();
        let cancelled = self.shared.board.cancel_remaining();
        tracing::info!(cancelled, "scan cancelled");
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.state.borrow() == RunState::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.state.borrow() == RunState::Cancelled
    }

    /// Status of every submitted domain, in submission order.
    pub fn snapshot(&self) -> Vec<CheckResult> {
        self.shared.board.snapshot()
    }

    pub fn progress(&self) -> Progress {
        self.shared.board.progress()
    }

    /// Wait while paused. Returns `false` once the run is cancelled.
    pub(crate) async fn checkpoint(&self) -> bool {
        let mut state = self.shared.state.subscribe();
        let current = match state.wait_for(|s| *s != RunState::Paused).await {
            Ok(current) => *current,
            Err(_) => RunState::Cancelled,
        };
        current != RunState::Cancelled
    }

    /// Sleep for `delay` unless the run is cancelled first.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub(crate) async fn sleep(&self, delay: Duration) -> bool {
        let state = self.shared.state.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = wait_for_cancel(state) => false,
        }
    }

    pub(crate) fn next_job(&self) -> Option<(usize, String)> {
        self.shared.queue.pop()
    }

    pub(crate) fn record(&self, index: usize, status: CheckStatus) -> bool {
        self.shared.board.record(index, status)
    }
}

async fn wait_for_cancel(mut state: watch::Receiver<RunState>) {
    let _ = state.wait_for(|s| *s == RunState::Cancelled).await;
}

/// Consumer side of a streaming run started with
/// [`CheckEngine::start`](crate::CheckEngine::start).
///
/// Dropping an unfinished handle cancels the run.
pub struct ScanHandle {
    control: ScanControl,
    events: mpsc::UnboundedReceiver<ScanEvent>,
}

impl ScanHandle {
    pub(crate) fn new(control: ScanControl, events: mpsc::UnboundedReceiver<ScanEvent>) -> Self {
        Self { control, events }
    }

    /// Next settled domain, or `None` once every domain is terminal.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    pub fn control(&self) -> ScanControl {
        self.control.clone()
    }

    pub fn snapshot(&self) -> Vec<CheckResult> {
        self.control.snapshot()
    }

    pub fn progress(&self) -> Progress {
        self.control.progress()
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if !self.control.progress().is_finished() {
            self.control.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
