//! Best-effort notification when a healthcheck fails.
//!
//! Errors here never change the outcome of the check that triggered them.

use std::process::{Output, Stdio};
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::appjson::OnFailure;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("failed to execute on failure command: {0}")]
    Command(#[from] std::io::Error),
    #[error("on failure command exited with {0}")]
    CommandStatus(std::process::ExitStatus),
    #[error("failed to send data to URL: {0}")]
    Request(#[from] reqwest::Error),
    #[error("post request failed with status: {0}")]
    Status(reqwest::StatusCode),
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct FailurePayload<'a> {
    healthcheck_name: &'a str,
    errors: &'a [String],
}

/// Runs the configured command and posts to the configured URL.
///
/// Both are attempted even if the first fails; every failure is returned.
pub async fn trigger(on_failure: &OnFailure, name: &str, errors: &[String]) -> Vec<TriggerError> {
    let mut failures = Vec::new();

    if let Some((program, args)) = on_failure.command.split_first() {
        log::info!("Running on failure command for healthcheck name='{}'", name);
        match run_command(program, args).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => failures.push(TriggerError::CommandStatus(output.status)),
            Err(e) => failures.push(e.into()),
        }
    }

    if !on_failure.url.is_empty() {
        log::info!("Notifying {} of failed healthcheck name='{}'", on_failure.url, name);
        if let Err(e) = post(&on_failure.url, name, errors, REQUEST_TIMEOUT).await {
            failures.push(e);
        }
    }

    failures
}

/// Output is captured so it never reaches the checker's own stdout.
async fn run_command(program: &str, args: &[String]) -> std::io::Result<Output> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() || !stderr.trim().is_empty() {
        log::debug!(
            "On failure command {} stdout: {} stderr: {}",
            program,
            stdout.trim(),
            stderr.trim()
        );
    }
    Ok(output)
}

async fn post(
    url: &str,
    name: &str,
    errors: &[String],
    timeout: Duration,
) -> Result<(), TriggerError> {
    let payload = FailurePayload {
        healthcheck_name: name,
        errors,
    };
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.post(url).json(&payload).send().await?;
    if !response.status().is_success() {
        return Err(TriggerError::Status(response.status()));
    }
    Ok(())
}
