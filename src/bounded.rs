//! Deadline-bounded execution with panic capture.
//!
//! Work runs on its own task and reports back over a single-slot channel.
//! The caller races that channel against the deadline. On timeout the
//! worker is abandoned: it finishes on its own and its result is dropped
//! with the channel, so a slow render can never write into a response
//! that already went out as a timeout.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::oneshot;

/// Result of racing a unit of work against its deadline.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Work finished inside the deadline.
    Completed(T),
    /// Work panicked; the message is best-effort.
    Panicked(String),
    /// Deadline elapsed first.
    TimedOut { elapsed: Duration },
}

/// Races a future against `bound`.
pub async fn run<F, T>(work: F, bound: Duration) -> Outcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let started = Instant::now();
    tokio::spawn(async move {
        let result = AssertUnwindSafe(work).catch_unwind().await;
        let _ = tx.send(result);
    });
    race(rx, started, bound).await
}

/// Races a blocking closure against `bound`. The closure runs on the
/// blocking thread pool.
pub async fn run_blocking<F, T>(work: F, bound: Duration) -> Outcome<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let started = Instant::now();
    tokio::task::spawn_blocking(move || {
        let result = std::panic::catch_unwind(AssertUnwindSafe(work));
        let _ = tx.send(result);
    });
    race(rx, started, bound).await
}

async fn race<T>(
    rx: oneshot::Receiver<Result<T, Box<dyn Any + Send>>>,
    started: Instant,
    bound: Duration,
) -> Outcome<T> {
    tokio::select! {
        result = rx => match result {
            Ok(Ok(value)) => Outcome::Completed(value),
            Ok(Err(panic)) => Outcome::Panicked(panic_message(panic)),
            Err(_) => Outcome::Panicked("worker was cancelled".to_string()),
        },
        _ = tokio::time::sleep(bound) => Outcome::TimedOut { elapsed: started.elapsed() },
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Compact duration formatting for logs and timeout responses.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed >= Duration::from_secs(1) {
        format!("{:.3}s", elapsed.as_secs_f64())
    } else if elapsed >= Duration::from_millis(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{}µs", elapsed.as_micros())
    }
}
