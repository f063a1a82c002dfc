//! Container runtime capabilities consumed by the probes.
//!
//! Probes never talk to Docker directly. They go through [`ContainerRuntime`],
//! which the bollard-backed [`docker::DockerRuntime`] implements for real runs
//! and which tests replace with scripted fakes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod docker;
pub mod netns;

/// Read-only snapshot of a container, taken from an inspect call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub id: String,
    /// Docker status string (`running`, `exited`, `restarting`, ...).
    pub status: String,
    pub running: bool,
    pub pid: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: i64,
    /// Network name to IP address.
    pub networks: HashMap<String, String>,
    pub entrypoint: Vec<String>,
    pub shell: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl ContainerState {
    /// Time elapsed since the container was started, as seen at `now`.
    ///
    /// Returns zero when the start timestamp is in the future and `None` when
    /// the runtime did not report one.
    pub fn uptime_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started_at = self.started_at?;
        Some((now - started_at).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn ip_address(&self, network: &str) -> Option<&str> {
        self.networks.get(network).map(String::as_str)
    }
}

/// Combined stdout and stderr of a command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub output: Vec<u8>,
    pub exit_code: i64,
}

/// Output of a command executed on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("No such container: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing {0} binary in PATH")]
    MissingBinary(&'static str),
    #[error("invalid container start time '{0}': {1}")]
    StartedAt(String, chrono::ParseError),
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn inspect(&self, id: &str) -> Result<ContainerState, RuntimeError>;

    /// Runs `argv` inside the container and waits for it to exit.
    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError>;

    /// Writes `contents` to the absolute `path` inside the container.
    async fn copy_file(
        &self,
        id: &str,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), RuntimeError>;

    /// Lists sockets from inside the network namespace of host process `pid`.
    async fn list_sockets(&self, pid: i64) -> Result<CommandOutput, RuntimeError>;
}
