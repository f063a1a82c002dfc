//! Listening checks: the process must be bound to a wildcard interface on the
//! expected port, as seen from inside the container's network namespace.

use std::fmt;

use super::{ProbeError, ProbeOutcome};
use crate::healthcheck::Healthcheck;
use crate::healthcheck::address::{classify, parse_listening};
use crate::healthcheck::retry::{retry, with_deadline};
use crate::runtime::{ContainerRuntime, ContainerState, RuntimeError};

/// Why the socket table could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceFailure {
    MissingNsenter,
    MissingNetstat,
    /// `/proc/<pid>` is not visible, so the checker is not in the host PID namespace.
    HostPidNamespace,
    Other(String),
}

impl NamespaceFailure {
    fn from_stderr(stderr: &str) -> Self {
        let message = stderr.trim();
        if message == "nsenter: No such file or directory" {
            NamespaceFailure::MissingNsenter
        } else if message.ends_with("netstat: No such file or directory") {
            NamespaceFailure::MissingNetstat
        } else if message.starts_with("nsenter: cannot open /proc/")
            && message.ends_with("No such file or directory")
        {
            NamespaceFailure::HostPidNamespace
        } else {
            NamespaceFailure::Other(message.to_string())
        }
    }
}

impl fmt::Display for NamespaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceFailure::MissingNsenter => write!(f, "missing nsenter binary in PATH"),
            NamespaceFailure::MissingNetstat => write!(f, "missing netstat binary in PATH"),
            NamespaceFailure::HostPidNamespace => write!(f, "ensure runtime PID namespace is host"),
            NamespaceFailure::Other(message) => write!(f, "{message}"),
        }
    }
}

pub async fn run(
    check: &Healthcheck,
    port: u16,
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
) -> ProbeOutcome {
    let result = retry(check.attempts, check.wait, |_| async move {
        with_deadline(check.timeout, attempt(port, container, runtime)).await
    })
    .await;

    match result {
        Ok(()) => ProbeOutcome::default(),
        Err(errors) => ProbeOutcome::failed(Vec::new(), errors),
    }
}

async fn attempt(
    port: u16,
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
) -> Result<(), ProbeError> {
    if !container.running || container.pid == 0 {
        return Err(ProbeError::NotRunning);
    }

    let listing = match runtime.list_sockets(container.pid).await {
        Ok(listing) => listing,
        Err(RuntimeError::MissingBinary("nsenter")) => {
            return Err(ProbeError::Namespace(NamespaceFailure::MissingNsenter));
        }
        Err(e) => return Err(e.into()),
    };

    if listing.exit_code != 0 {
        return Err(ProbeError::Namespace(NamespaceFailure::from_stderr(
            &listing.stderr,
        )));
    }

    let addresses = parse_listening(&listing.stdout);
    log::debug!(
        "Container {} listening on {:?}",
        container.id,
        addresses
    );
    classify(&addresses, port)?;
    Ok(())
}
