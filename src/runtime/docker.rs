//! Docker runtime backed by bollard.
//!
//! This module provides a shared Docker client instance and the
//! [`ContainerRuntime`] implementation the probes use in production.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::ContainerInspectResponse;
use bollard::query_parameters::{InspectContainerOptionsBuilder, UploadToContainerOptionsBuilder};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;

use super::{CommandOutput, ContainerRuntime, ContainerState, ExecOutput, RuntimeError, netns};

const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);

static DOCKER_CLIENT: OnceLock<Docker> = OnceLock::new();

/// Get a reference to the shared Docker client.
///
/// The client is created on first use from the local defaults
/// (`DOCKER_HOST`, or the Unix socket on Linux/macOS).
pub fn get_docker() -> Result<&'static Docker, RuntimeError> {
    if let Some(docker) = DOCKER_CLIENT.get() {
        return Ok(docker);
    }
    let docker = Docker::connect_with_local_defaults()?;
    Ok(DOCKER_CLIENT.get_or_init(|| docker))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DockerRuntime;

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, id: &str) -> Result<ContainerState, RuntimeError> {
        let docker = get_docker()?;
        let options = InspectContainerOptionsBuilder::new().build();

        match docker.inspect_container(id, Some(options)).await {
            Ok(info) => container_state(info),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(RuntimeError::NotFound(id.to_string())),
            Err(e) => Err(RuntimeError::DockerApi(e)),
        }
    }

    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError> {
        let docker = get_docker()?;

        let exec = docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(argv.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = Vec::new();
        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        if let StartExecResults::Attached { output: mut stream, .. } =
            docker.start_exec(&exec.id, Some(options)).await?
        {
            while let Some(chunk) = stream.next().await {
                output.extend_from_slice(&chunk?.into_bytes());
            }
        }

        // The stream can close a moment before the daemon records the exit code
        loop {
            let inspect = docker.inspect_exec(&exec.id).await?;
            if !inspect.running.unwrap_or(false) {
                let exit_code = inspect.exit_code.unwrap_or(-1);
                log::debug!("Exec {} in {} exited with {}", exec.id, id, exit_code);
                return Ok(ExecOutput { output, exit_code });
            }
            tokio::time::sleep(EXEC_POLL_INTERVAL).await;
        }
    }

    async fn copy_file(
        &self,
        id: &str,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), RuntimeError> {
        let docker = get_docker()?;
        let (dir, file_name) = match path.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((dir, name)) => (dir, name),
            None => ("/", path),
        };

        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_mtime(Utc::now().timestamp().max(0) as u64);
        let mut archive = tar::Builder::new(Vec::new());
        archive.append_data(&mut header, file_name, contents)?;
        let archive = archive.into_inner()?;

        let options = UploadToContainerOptionsBuilder::new().path(dir).build();
        docker
            .upload_to_container(id, Some(options), bollard::body_full(Bytes::from(archive)))
            .await
            .inspect_err(|e| log::error!("Failed to copy {} into {}: {}", path, id, e))?;
        Ok(())
    }

    async fn list_sockets(&self, pid: i64) -> Result<CommandOutput, RuntimeError> {
        netns::list_listening_sockets(pid).await
    }
}

fn container_state(info: ContainerInspectResponse) -> Result<ContainerState, RuntimeError> {
    let state = info.state.unwrap_or_default();
    let config = info.config.unwrap_or_default();

    let started_at = match state.started_at {
        Some(raw) if !raw.is_empty() => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| RuntimeError::StartedAt(raw.clone(), e))?
                .with_timezone(&Utc),
        ),
        _ => None,
    };

    let networks = info
        .network_settings
        .and_then(|settings| settings.networks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, endpoint)| endpoint.ip_address.map(|ip| (name, ip)))
        .collect();

    Ok(ContainerState {
        id: info.id.unwrap_or_default(),
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        running: state.running.unwrap_or(false),
        pid: state.pid.unwrap_or(0),
        started_at,
        restart_count: info.restart_count.unwrap_or(0),
        networks,
        entrypoint: config.entrypoint.unwrap_or_default(),
        shell: config.shell.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
    })
}
