// ─── Background Tasks ───
// Long operations run as spawned tokio tasks with a cancellation token, so a
// host UI never blocks on them. `schedule` is the timer primitive behind the
// device-code poller.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::error::{LauncherError, LauncherResult};

/// A spawned operation that can be cancelled and awaited.
pub struct BackgroundTask<T> {
    handle: JoinHandle<T>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Spawn `f` with a fresh cancellation token.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(f(cancel.clone()));
        Self { handle, cancel }
    }

    /// Request cancellation. What "cancelled" means is up to the task.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> LauncherResult<T> {
        self.handle
            .await
            .map_err(|e| LauncherError::Other(format!("background task failed: {}", e)))
    }
}

/// What a scheduled tick asks for next.
#[derive(Debug)]
pub enum Tick<T> {
    /// Run again after the current interval.
    Continue,
    /// Run again after a new interval, which becomes the current one.
    Reschedule(Duration),
    Done(T),
}

/// How a scheduled loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Scheduled<T> {
    Completed(T),
    Cancelled,
    /// The deadline passed before the tick reported `Done`.
    Expired,
}

/// Run `tick` every `interval` until it finishes, `cancel` fires, or
/// `deadline` passes. The first tick runs after one interval. No tick is
/// started once the deadline has been reached.
pub async fn run_every<T, F, Fut>(
    mut interval: Duration,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    mut tick: F,
) -> Scheduled<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Tick<T>>,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Scheduled::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Scheduled::Expired;
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Scheduled::Cancelled,
            outcome = tick() => outcome,
        };

        match outcome {
            Tick::Continue => {}
            Tick::Reschedule(next) => interval = next,
            Tick::Done(value) => return Scheduled::Completed(value),
        }
    }
}

/// Spawn a repeating tick on the runtime. Cancelling the returned task is
/// the cancel handle.
pub fn schedule<T, F, Fut>(interval: Duration, tick: F) -> BackgroundTask<Scheduled<T>>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Tick<T>> + Send + 'static,
{
    BackgroundTask::spawn(move |cancel| run_every(interval, None, cancel, tick))
}
