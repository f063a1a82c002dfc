//! Socket listing from inside a container's network namespace.
//!
//! Runs `nsenter -t <pid> -n netstat -plant` on the host. This needs the
//! checker to share the host PID namespace and have both binaries on `PATH`.

use std::process::Stdio;

use tokio::process::Command;

use super::{CommandOutput, RuntimeError};

pub async fn list_listening_sockets(pid: i64) -> Result<CommandOutput, RuntimeError> {
    let pid = pid.to_string();
    let output = Command::new("nsenter")
        .args(["-t", pid.as_str(), "-n", "netstat", "-plant"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RuntimeError::MissingBinary("nsenter"),
            _ => RuntimeError::Io(e),
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
