//! Running a script function on a worker thread.
//!
//! # Architecture
//!
//! - `run()` spawns one named thread per invocation with a clone of the
//!   runtime's `Lua` handle and calls the function there
//! - The runtime's [`ProgressRoute`](crate::progress::ProgressRoute) is
//!   attached to a channel for the duration, so `aegisub.progress.*` and
//!   `print` from the worker arrive as `ProgressEvent`s
//! - The caller blocks in a `recv_timeout` loop, draining progress into its
//!   sink and polling `ProgressSink::is_cancelled`
//! - On cancel the caller stops waiting and returns `RunOutcome::Cancelled`.
//!   The worker is not interrupted: it sees `aegisub.progress.is_cancelled()`
//!   turn true and keeps running until the script returns. Until then the
//!   runtime reports busy and refuses new invocations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use mlua::{Function, MultiValue, Value};

use crate::error::{format_lua_error, AutomationError};
use crate::progress::{CancelToken, ProgressEvent, ProgressSink};
use crate::runtime::ScriptRuntime;

/// How a threaded invocation ended, from the caller's point of view.
#[derive(Debug)]
pub enum RunOutcome {
    /// The function returned; values padded or truncated to the expected count.
    Completed(Vec<Value>),
    /// The function raised. The message was also sent to the progress log.
    Failed(String),
    /// The caller stopped waiting. The worker may still be running.
    Cancelled,
}

/// Call `func(args)` on a worker thread and wait for it, reporting progress
/// to `sink`.
pub fn run(
    runtime: &ScriptRuntime,
    func: Function,
    args: MultiValue,
    expected_results: usize,
    title: &str,
    sink: &mut dyn ProgressSink,
) -> Result<RunOutcome, AutomationError> {
    let busy = runtime.busy_flag().clone();
    if busy
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(AutomationError::Busy);
    }

    let route = runtime.route().clone();
    let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>();
    let (done_tx, done_rx) = mpsc::channel::<Result<Vec<Value>, String>>();
    let cancel: CancelToken = Arc::new(AtomicBool::new(false));
    route.attach(progress_tx, cancel.clone());

    sink.set_title(title);

    let lua = runtime.lua().clone();
    let worker_route = route.clone();
    let worker_busy = busy.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("automation-{}", title))
        .spawn(move || {
            let result = match func.call::<MultiValue>(args) {
                Ok(values) => {
                    let mut values: Vec<Value> = values.into_iter().collect();
                    values.resize(expected_results, Value::Nil);
                    Ok(values)
                }
                Err(e) => {
                    let msg = format_lua_error(&e);
                    worker_route.emit(ProgressEvent::Log("Lua reported a runtime error:".to_string()));
                    worker_route.emit(ProgressEvent::Log(msg.clone()));
                    Err(msg)
                }
            };
            if let Err(e) = lua.gc_collect() {
                log::warn!("Lua garbage collection failed: {}", e);
            }
            worker_busy.store(false, Ordering::SeqCst);
            let _ = done_tx.send(result);
        });

    if let Err(e) = spawned {
        route.detach();
        busy.store(false, Ordering::SeqCst);
        return Err(AutomationError::Runtime(format!("failed to start script thread: {}", e)));
    }

    let poll = runtime.poll_interval();
    loop {
        for event in progress_rx.try_iter() {
            sink.dispatch(event);
        }

        match done_rx.recv_timeout(poll) {
            Ok(result) => {
                route.detach();
                for event in progress_rx.try_iter() {
                    sink.dispatch(event);
                }
                return Ok(match result {
                    Ok(values) => RunOutcome::Completed(values),
                    Err(msg) => RunOutcome::Failed(msg),
                });
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if sink.is_cancelled() {
                    log::info!("invocation \"{}\" cancelled, detaching worker", title);
                    cancel.store(true, Ordering::SeqCst);
                    route.detach();
                    return Ok(RunOutcome::Cancelled);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Worker died without reporting (panic).
                route.detach();
                busy.store(false, Ordering::SeqCst);
                let msg = "script thread exited without a result".to_string();
                sink.log(&msg);
                return Ok(RunOutcome::Failed(msg));
            }
        }
    }
}
