//! Dedicated execution loop.
//!
//! One persistent current-thread tokio runtime lives on its own OS thread for
//! the lifetime of the bridge. Host threads hand futures to it and block on a
//! bounded wait; background tasks spawned inside (keep-alive, the client's
//! receive loop) survive between host calls.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard, mpsc},
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use bridge_core::{BridgeError, BridgeErrorCategory, LoopState, LoopStateMachine};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, info, warn};

const LOOP_THREAD_NAME: &str = "whitemax-loop";

/// Timeouts governing the execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTimeouts {
    pub ready: Duration,
    pub call: Duration,
    pub drain: Duration,
}

#[derive(Debug)]
struct RunningLoop {
    handle: Handle,
    thread_id: ThreadId,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct LoopSlot {
    state: LoopStateMachine,
    running: Option<RunningLoop>,
}

#[derive(Debug)]
pub struct ExecutionLoop {
    timeouts: LoopTimeouts,
    slot: Mutex<LoopSlot>,
}

impl ExecutionLoop {
    pub fn new(timeouts: LoopTimeouts) -> Self {
        Self {
            timeouts,
            slot: Mutex::new(LoopSlot::default()),
        }
    }

    pub fn state(&self) -> LoopState {
        self.lock_slot().state.state()
    }

    pub fn is_running(&self) -> bool {
        self.lock_slot().state.is_running()
    }

    /// Whether the current thread is the loop's own thread.
    pub fn is_loop_thread(&self) -> bool {
        let current = thread::current().id();
        self.lock_slot()
            .running
            .as_ref()
            .is_some_and(|running| running.thread_id == current)
    }

    /// Run `future` on the loop and block until it finishes or the call
    /// timeout elapses. The loop is started on first use.
    ///
    /// A timeout stops the wait only; the future keeps running on the loop.
    pub fn run<F, T>(&self, future: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, BridgeError>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_loop_thread() {
            return Err(BridgeError::new(
                BridgeErrorCategory::Contract,
                "called_from_loop_thread",
                "blocking bridge call made from the execution loop thread",
            ));
        }

        let handle = self.ensure_started()?;
        let (tx, rx) = mpsc::sync_channel(1);
        handle.spawn(async move {
            let _ = tx.send(future.await);
        });

        match rx.recv_timeout(self.timeouts.call) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.timeouts.call.as_millis() as u64, "bridge call timed out");
                Err(BridgeError::new(
                    BridgeErrorCategory::Timeout,
                    "call_timeout",
                    format!(
                        "async call timed out after {} ms",
                        self.timeouts.call.as_millis()
                    ),
                ))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BridgeError::new(
                BridgeErrorCategory::Internal,
                "call_dropped",
                "execution loop stopped before the call completed",
            )),
        }
    }

    /// Stop the loop: cancel pending tasks, drain them for up to the drain
    /// timeout, and join the thread. No-op when the loop is not running.
    pub fn stop(&self) -> Result<(), BridgeError> {
        if self.is_loop_thread() {
            return Err(BridgeError::new(
                BridgeErrorCategory::Contract,
                "called_from_loop_thread",
                "execution loop cannot stop itself",
            ));
        }

        let running = {
            let mut slot = self.lock_slot();
            let Some(running) = slot.running.take() else {
                return Ok(());
            };
            slot.state.begin_drain()?;
            running
        };

        let _ = running.shutdown.send(());
        if running.thread.join().is_err() {
            warn!("execution loop thread panicked during shutdown");
        }

        self.lock_slot().state.on_drained()?;
        info!("execution loop stopped");
        Ok(())
    }

    fn ensure_started(&self) -> Result<Handle, BridgeError> {
        let mut slot = self.lock_slot();
        if let Some(running) = slot.running.as_ref() {
            return Ok(running.handle.clone());
        }

        slot.state.begin_start()?;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let drain = self.timeouts.drain;

        let spawned = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_owned())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                debug!("execution loop draining pending tasks");
                runtime.shutdown_timeout(drain);
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                slot.state.on_start_failed();
                return Err(loop_not_started(err.to_string()));
            }
        };

        let handle = match await_readiness(&ready_rx, self.timeouts.ready) {
            Ok(handle) => handle,
            Err(err) => {
                slot.state.on_start_failed();
                let _ = shutdown_tx.send(());
                return Err(err);
            }
        };

        slot.state.on_ready()?;
        slot.running = Some(RunningLoop {
            handle: handle.clone(),
            thread_id: thread.thread().id(),
            shutdown: shutdown_tx,
            thread,
        });
        info!("execution loop started");
        Ok(handle)
    }

    fn lock_slot(&self) -> MutexGuard<'_, LoopSlot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ExecutionLoop {
    fn drop(&mut self) {
        let running = self.lock_slot().running.take();
        if let Some(running) = running {
            let _ = running.shutdown.send(());
            if running.thread_id != thread::current().id() {
                let _ = running.thread.join();
            }
        }
    }
}

/// Wait for the loop thread to hand back its runtime handle.
fn await_readiness(
    ready_rx: &mpsc::Receiver<Result<Handle, String>>,
    timeout: Duration,
) -> Result<Handle, BridgeError> {
    match ready_rx.recv_timeout(timeout) {
        Ok(Ok(handle)) => Ok(handle),
        Ok(Err(reason)) => Err(loop_not_started(reason)),
        Err(_) => Err(loop_not_started("no readiness signal".to_owned())),
    }
}

fn loop_not_started(reason: String) -> BridgeError {
    BridgeError::new(
        BridgeErrorCategory::Internal,
        "loop_not_started",
        format!("loop did not start: {reason}"),
    )
}
