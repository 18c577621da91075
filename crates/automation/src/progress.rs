//! Progress reporting for script invocations.
//!
//! Scripts call `aegisub.progress.*`, `aegisub.debug.out` and `print` from
//! the worker thread. Those calls land on a [`ProgressRoute`], which forwards
//! them as [`ProgressEvent`]s over a channel to the waiting caller while an
//! invocation is attached, and to the `log` crate otherwise. The caller drains
//! the channel into a [`ProgressSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use parking_lot::Mutex;

/// Cancel token for an invocation.
/// Set to true to tell the script it should stop.
pub type CancelToken = Arc<AtomicBool>;

/// Maximum number of log chunks a [`CollectingProgress`] keeps by default.
pub const DEFAULT_MAX_LOG_LINES: usize = 5_000;

/// A progress report from a running script.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Log(String),
    Progress(f64),
    Task(String),
    Title(String),
}

/// Receives progress for one invocation, on the caller's thread.
pub trait ProgressSink {
    fn log(&mut self, text: &str);

    fn set_progress(&mut self, _percent: f64) {}

    fn set_task(&mut self, _task: &str) {}

    fn set_title(&mut self, _title: &str) {}

    /// Polled while the worker runs. Returning true detaches the worker.
    fn is_cancelled(&self) -> bool {
        false
    }

    fn dispatch(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Log(text) => self.log(&text),
            ProgressEvent::Progress(p) => self.set_progress(p),
            ProgressEvent::Task(t) => self.set_task(&t),
            ProgressEvent::Title(t) => self.set_title(&t),
        }
    }
}

/// Writes everything to the `log` crate. Never cancels.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn log(&mut self, text: &str) {
        log::info!(target: "automation", "{}", text);
    }

    fn set_progress(&mut self, percent: f64) {
        log::debug!(target: "automation", "progress {:.1}%", percent);
    }

    fn set_task(&mut self, task: &str) {
        log::debug!(target: "automation", "task: {}", task);
    }

    fn set_title(&mut self, title: &str) {
        log::debug!(target: "automation", "title: {}", title);
    }
}

/// Keeps log output and the latest progress state in memory.
///
/// Cancellation is requested through the shared flag returned by
/// [`CollectingProgress::cancel_token`] or by an optional deadline.
#[derive(Debug)]
pub struct CollectingProgress {
    pub lines: Vec<String>,
    pub percent: f64,
    pub task: String,
    pub title: String,
    pub truncated: bool,
    max_lines: usize,
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::with_max_lines(DEFAULT_MAX_LOG_LINES)
    }

    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            lines: Vec::new(),
            percent: 0.0,
            task: String::new(),
            title: String::new(),
            truncated: false,
            max_lines,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Treat the invocation as cancelled once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl Default for CollectingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for CollectingProgress {
    fn log(&mut self, text: &str) {
        if self.lines.len() < self.max_lines {
            self.lines.push(text.to_string());
        } else if !self.truncated {
            self.truncated = true;
            log::warn!(target: "automation", "log limit of {} lines reached, dropping output", self.max_lines);
        }
    }

    fn set_progress(&mut self, percent: f64) {
        self.percent = percent.clamp(0.0, 100.0);
    }

    fn set_task(&mut self, task: &str) {
        self.task = task.to_string();
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn is_cancelled(&self) -> bool {
        if self.cancel.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

// =============================================================================
// Route (script side)
// =============================================================================

struct RouteState {
    tx: Option<mpsc::Sender<ProgressEvent>>,
    cancel: Option<CancelToken>,
}

/// Where script-side progress calls go. One per runtime.
#[derive(Clone)]
pub struct ProgressRoute {
    state: Arc<Mutex<RouteState>>,
}

impl ProgressRoute {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RouteState { tx: None, cancel: None })),
        }
    }

    /// Forward events to `tx` until [`detach`](Self::detach).
    pub fn attach(&self, tx: mpsc::Sender<ProgressEvent>, cancel: CancelToken) {
        let mut state = self.state.lock();
        state.tx = Some(tx);
        state.cancel = Some(cancel);
    }

    /// Stop forwarding. The cancel token stays visible to the script until
    /// the next attach.
    pub fn detach(&self) {
        self.state.lock().tx = None;
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().tx.is_some()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let state = self.state.lock();
        let undelivered = match &state.tx {
            Some(tx) => tx.send(event).err().map(|e| e.0),
            None => Some(event),
        };
        drop(state);

        // Nobody is listening: outside an invocation, or the caller detached.
        match undelivered {
            Some(ProgressEvent::Log(text)) => log::info!(target: "automation", "{}", text),
            Some(other) => log::trace!(target: "automation", "{:?}", other),
            None => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .cancel
            .as_ref()
            .map_or(false, |c| c.load(Ordering::SeqCst))
    }
}

impl Default for ProgressRoute {
    fn default() -> Self {
        Self::new()
    }
}
