#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Hard deadlines around check invocations.
//!
//! A blocking check runs on its own worker thread while the caller races its
//! completion against a timer. When the timer wins, the worker is abandoned:
//! it may keep running until the process exits, but nothing waits for it and
//! nothing it produces is used. Futures get the same treatment, each driven by
//! a runtime of its own on the worker thread.

use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::sync::oneshot;

use crate::outcome::{
    FailureLocation, WORKER_THREAD_PREFIX, install_panic_hook, panic_message, take_panic_location,
};

/// Counter used to give each worker thread a distinct name.
static WORKER_ID: AtomicU64 = AtomicU64::new(0);

/// Raised when a check exceeds its time limit.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Your code took longer than {} seconds to run, which is too long. We have kindly asked your \
     code to stop running.",
    .limit.as_secs_f64()
)]
pub struct TimeoutExceeded {
    /// The limit that was exceeded.
    limit: Duration,
}

impl TimeoutExceeded {
    /// Creates the condition for the given limit.
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    /// The limit that was exceeded.
    pub fn limit(&self) -> Duration {
        self.limit
    }
}

/// A panic caught on a worker.
#[derive(Debug, Clone)]
pub struct Panicked {
    /// The panic message.
    pub message:  String,
    /// Where the panic happened, when the hook could capture it.
    pub location: Option<FailureLocation>,
}

/// Why a guarded operation did not produce a value.
#[derive(thiserror::Error, Debug)]
pub enum Interrupted {
    /// The deadline fired first.
    #[error(transparent)]
    Timeout(#[from] TimeoutExceeded),
    /// The operation panicked.
    #[error("operation panicked: {}", .0.message)]
    Panicked(Panicked),
    /// The worker could not be started.
    #[error("could not start a worker for the check: {0}")]
    Spawn(#[source] std::io::Error),
    /// The worker went away without reporting back.
    #[error("the worker running the check stopped without reporting a result")]
    WorkerLost,
}

/// Runs a blocking operation with an optional deadline.
///
/// With `None` the operation runs to completion however long it takes.
/// Otherwise, if it has not finished when `limit` elapses, it is abandoned
/// and [`Interrupted::Timeout`] is returned. Each call owns its own timer, so
/// consecutive calls never see each other's deadlines.
pub async fn run_with_deadline<T, F>(limit: Option<Duration>, op: F) -> Result<T, Interrupted>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    install_panic_hook();

    let (tx, rx) = oneshot::channel();
    let name = format!("{WORKER_THREAD_PREFIX}-{}", WORKER_ID.fetch_add(1, Ordering::Relaxed));

    // The join handle is dropped straight away: an abandoned worker is detached.
    std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(op)).map_err(|payload| Panicked {
                message:  panic_message(payload.as_ref()),
                location: take_panic_location(),
            });
            let _ = tx.send(result);
        })
        .map_err(Interrupted::Spawn)?;

    let received = match limit {
        None => rx.await,
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(received) => received,
            Err(_) => {
                tracing::warn!("check exceeded its {:?} limit and was abandoned", limit);
                return Err(TimeoutExceeded::new(limit).into());
            }
        },
    };

    match received {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(panicked)) => Err(Interrupted::Panicked(panicked)),
        Err(_) => Err(Interrupted::WorkerLost),
    }
}

/// Runs a future with an optional deadline.
///
/// The future is driven by a private current-thread runtime on its own worker
/// thread, so a body that blocks without awaiting is abandoned like a blocking
/// check. On expiry the worker's runtime is told to stop polling; a future
/// that reaches an `.await` is then dropped along with everything it owns
/// (child processes included).
pub async fn run_future_with_deadline<T, Fut>(
    limit: Option<Duration>,
    future: Fut,
) -> Result<T, Interrupted>
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (abandon_tx, abandon_rx) = oneshot::channel::<()>();

    let finished = run_with_deadline(limit, move || -> std::io::Result<Option<T>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(async move {
            tokio::select! {
                value = future => Some(value),
                _ = abandon_rx => None,
            }
        }))
    })
    .await;
    drop(abandon_tx);

    match finished? {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(Interrupted::WorkerLost),
        Err(err) => Err(Interrupted::Spawn(err)),
    }
}
