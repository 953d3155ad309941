use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{config::KeepAliveTimings, guard::SessionGuard};

#[derive(Debug)]
struct RunningKeepAlive {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Background daemon that keeps the socket warm so server pushes keep flowing
/// while no foreground call is in flight.
#[derive(Debug)]
pub struct KeepAlive {
    timings: KeepAliveTimings,
    running: Mutex<Option<RunningKeepAlive>>,
}

impl KeepAlive {
    pub fn new(timings: KeepAliveTimings) -> Self {
        Self {
            timings,
            running: Mutex::new(None),
        }
    }

    /// Spawn the daemon on the current runtime unless it is already running.
    ///
    /// Returns `true` when a new daemon was started. Nothing is started while
    /// the client has no auth token.
    pub async fn start_once(&self, guard: Arc<SessionGuard>) -> bool {
        let mut slot = self.running.lock().await;
        if slot.as_ref().is_some_and(|running| !running.task.is_finished()) {
            return false;
        }
        if guard.client().token().is_none() {
            debug!("keep-alive not started: no auth token");
            return false;
        }

        let stop = CancellationToken::new();
        let task = tokio::spawn(run_keepalive(guard, self.timings, stop.child_token()));
        *slot = Some(RunningKeepAlive { stop, task });
        info!("keep-alive started");
        true
    }

    /// Cancel the daemon and wait for it to exit.
    ///
    /// Returns `true` when a daemon was running and has now fully exited.
    pub async fn stop(&self) -> bool {
        let running = {
            let mut slot = self.running.lock().await;
            slot.take()
        };

        let Some(running) = running else {
            return false;
        };

        running.stop.cancel();
        let _ = running.task.await;
        info!("keep-alive stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }
}

async fn run_keepalive(
    guard: Arc<SessionGuard>,
    timings: KeepAliveTimings,
    stop: CancellationToken,
) {
    tokio::select! {
        _ = stop.cancelled() => return,
        _ = tokio::time::sleep(timings.settle) => {}
    }

    loop {
        let delay = if guard.client().token().is_some() {
            tokio::select! {
                _ = stop.cancelled() => break,
                result = guard.ensure_ready() => match result {
                    Ok(()) => timings.interval,
                    Err(err) => {
                        debug!(error = %err, "keep-alive iteration failed; backing off");
                        timings.error_backoff
                    }
                },
            }
        } else {
            timings.interval
        };

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
