//! Uptime checks: the container must stay up, without restarting, for a
//! minimum number of seconds.

use std::time::Duration;

use chrono::Utc;

use super::{ProbeError, ProbeOutcome};
use crate::runtime::{ContainerRuntime, ContainerState};

/// Waits out whatever is left of `min_seconds`, then re-inspects.
///
/// Evaluated once; a restart during the wait fails the check.
pub async fn run(
    min_seconds: u64,
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
) -> ProbeOutcome {
    let Some(uptime) = container.uptime_at(Utc::now()) else {
        return ProbeError::UnknownStartTime.into();
    };

    let remaining = min_seconds.saturating_sub(uptime.as_secs());
    if remaining > 0 {
        log::debug!(
            "Container {} up for {}s, waiting {}s more",
            container.id,
            uptime.as_secs(),
            remaining
        );
        tokio::time::sleep(Duration::from_secs(remaining)).await;
    }

    let current = match runtime.inspect(&container.id).await {
        Ok(current) => current,
        Err(e) => return ProbeError::from(e).into(),
    };

    let status = format!("state={}", current.status).into_bytes();
    if !current.running {
        return ProbeOutcome::failed(status, vec![ProbeError::NotRunning]);
    }
    if current.restart_count > 0 {
        return ProbeOutcome::failed(status, vec![ProbeError::Restarted(current.restart_count)]);
    }
    ProbeOutcome::passed(status)
}
