//! Fixed-interval retry with an optional deadline per attempt.

use std::future::Future;
use std::time::Duration;

use super::probe::ProbeError;

/// Calls `attempt` up to `attempts` times, sleeping `wait` between calls.
///
/// The first success is returned as is and earlier failures are dropped.
/// When every attempt fails, all errors come back in the order they happened.
/// `attempt` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(attempts: u32, wait: Duration, mut attempt: F) -> Result<T, Vec<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut errors = Vec::new();

    for n in 1..=attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::debug!("Attempt {}/{} failed: {}", n, attempts, e);
                errors.push(e);
            }
        }
        if n < attempts && !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    Err(errors)
}

/// Runs `fut`, failing with [`ProbeError::Timeout`] once `timeout` elapses.
pub async fn with_deadline<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T, ProbeError>
where
    Fut: Future<Output = Result<T, ProbeError>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?,
        None => fut.await,
    }
}
