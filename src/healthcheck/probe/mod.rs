//! Probe strategies and their shared result types.

use std::time::Duration;

use serde::Serialize;

use super::address::AddressError;
use super::{DefinitionError, Healthcheck, ProbeKind};
use crate::runtime::{ContainerRuntime, ContainerState, RuntimeError};

pub mod command;
pub mod listening;
pub mod path;
pub mod uptime;

pub use listening::NamespaceFailure;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("non-zero exit code {code}")]
    NonZeroExit { code: i64, output: Vec<u8> },
    #[error("attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("container state is not running")]
    NotRunning,
    #[error("container has restarted {0} times")]
    Restarted(i64),
    #[error("container start time is unknown")]
    UnknownStartTime,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    Status(u16),
    #[error("unable to find expected content in response body: {0}")]
    MissingContent(String),
    #[error(
        "unable to enter the container to check that the process is bound to the correct port and interface: {0}"
    )]
    Namespace(NamespaceFailure),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("healthcheck worker failed unexpectedly: {0}")]
    Panicked(String),
}

/// What a probe produced: diagnostic output plus every error it hit.
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    pub output: Vec<u8>,
    pub errors: Vec<ProbeError>,
}

impl ProbeOutcome {
    pub fn passed(output: Vec<u8>) -> Self {
        Self {
            output,
            errors: Vec::new(),
        }
    }

    pub fn failed(output: Vec<u8>, errors: Vec<ProbeError>) -> Self {
        Self { output, errors }
    }
}

impl From<ProbeError> for ProbeOutcome {
    fn from(error: ProbeError) -> Self {
        Self::failed(Vec::new(), vec![error])
    }
}

/// Per-invocation inputs shared by every probe in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeContext {
    /// Network whose IP address path checks connect to.
    pub network: String,
    /// Skips the network lookup when set.
    pub ip_address: Option<String>,
    /// Extra headers sent by every path check.
    pub headers: Vec<(String, String)>,
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self {
            network: "bridge".to_string(),
            ip_address: None,
            headers: Vec::new(),
        }
    }
}

impl ProbeContext {
    /// Parses a `Name: value` header.
    pub fn parse_header(raw: &str) -> Result<(String, String), DefinitionError> {
        match raw.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(DefinitionError::InvalidHeader(raw.to_string())),
        }
    }
}

/// Runs the strategy matching the healthcheck's kind.
pub async fn execute(
    check: &Healthcheck,
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
    context: &ProbeContext,
) -> ProbeOutcome {
    match &check.kind {
        ProbeKind::Command { argv } => command::run(check, argv, container, runtime).await,
        ProbeKind::Path {
            path,
            port,
            scheme,
            content,
            headers,
        } => {
            let target = path::PathTarget {
                path,
                port: *port,
                scheme: *scheme,
                content: content.as_deref(),
                headers,
            };
            path::run(check, &target, container, context).await
        }
        ProbeKind::Listening { port } => listening::run(check, *port, container, runtime).await,
        ProbeKind::Uptime { seconds } => uptime::run(*seconds, container, runtime).await,
    }
}

/// One probe's result as handed back by the runner.
#[derive(Debug)]
pub struct ProbeResult {
    pub name: String,
    pub warn_only: bool,
    pub output: Vec<u8>,
    pub errors: Vec<ProbeError>,
}

impl ProbeResult {
    pub fn new(name: String, warn_only: bool, outcome: ProbeOutcome) -> Self {
        Self {
            name,
            warn_only,
            output: outcome.output,
            errors: outcome.errors,
        }
    }

    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn report(&self) -> ProbeReport {
        ProbeReport {
            name: self.name.clone(),
            passed: self.passed(),
            warn_only: self.warn_only,
            output: String::from_utf8_lossy(&self.output).trim().to_string(),
            errors: self.error_messages(),
        }
    }
}

/// Serialisable view of a [`ProbeResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub name: String,
    pub passed: bool,
    pub warn_only: bool,
    pub output: String,
    pub errors: Vec<String>,
}
