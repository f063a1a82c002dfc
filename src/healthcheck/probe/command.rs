//! Command checks: run argv inside the container and expect exit code 0.

use uuid::Uuid;

use super::{ProbeError, ProbeOutcome};
use crate::healthcheck::Healthcheck;
use crate::healthcheck::retry::{retry, with_deadline};
use crate::runtime::{ContainerRuntime, ContainerState};

/// Label set on images built by herokuish.
const HEROKUISH_STACK_LABEL: &str = "com.gliderlabs.herokuish/stack";
const SCRIPT_MODE: u32 = 0o755;

/// How a command is actually run inside a given container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan {
    Exec(Vec<String>),
    /// Copy `contents` to `path` first, then exec `argv`.
    Script {
        path: String,
        contents: String,
        argv: Vec<String>,
    },
}

/// Adapts `argv` to the container's entrypoint.
///
/// - entrypoint is the shell plus one token: that token runs the command
/// - any other entrypoint that is not just the shell prefixes the command
/// - herokuish images get the command as a script run through `/exec`
pub fn plan(argv: &[String], container: &ContainerState) -> CommandPlan {
    let shell = &container.shell;
    let entrypoint = &container.entrypoint;

    if entrypoint.len() == shell.len() + 1 && entrypoint.starts_with(shell) {
        let mut command = vec![entrypoint[shell.len()].clone()];
        command.extend_from_slice(argv);
        return CommandPlan::Exec(command);
    }

    if !entrypoint.is_empty() && entrypoint != shell {
        let mut command = entrypoint.clone();
        command.extend_from_slice(argv);
        return CommandPlan::Exec(command);
    }

    if container
        .labels
        .get(HEROKUISH_STACK_LABEL)
        .is_some_and(|stack| !stack.is_empty())
    {
        let path = format!("/tmp/healthcheck-{}", Uuid::now_v7().simple());
        let quoted: Vec<String> = argv.iter().map(|arg| format!("{arg:?}")).collect();
        return CommandPlan::Script {
            contents: format!("#!/bin/bash\n{}\n", quoted.join(" ")),
            argv: vec!["/exec".to_string(), "bash".to_string(), path.clone()],
            path,
        };
    }

    CommandPlan::Exec(argv.to_vec())
}

pub async fn run(
    check: &Healthcheck,
    argv: &[String],
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
) -> ProbeOutcome {
    let plan = &plan(argv, container);
    log::debug!("Healthcheck name='{}' runs {:?}", check.name, plan);

    let result = retry(check.attempts, check.wait, |_| async move {
        with_deadline(check.timeout, attempt(plan, container, runtime)).await
    })
    .await;

    match result {
        Ok(output) => ProbeOutcome::passed(output),
        Err(errors) => {
            let output = match errors.last() {
                Some(ProbeError::NonZeroExit { output, .. }) => output.clone(),
                _ => Vec::new(),
            };
            ProbeOutcome::failed(output, errors)
        }
    }
}

async fn attempt(
    plan: &CommandPlan,
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
) -> Result<Vec<u8>, ProbeError> {
    let argv = match plan {
        CommandPlan::Exec(argv) => argv,
        CommandPlan::Script {
            path,
            contents,
            argv,
        } => {
            runtime
                .copy_file(&container.id, path, contents.as_bytes(), SCRIPT_MODE)
                .await?;
            argv
        }
    };

    let exec = runtime.exec(&container.id, argv).await?;
    if exec.exit_code != 0 {
        return Err(ProbeError::NonZeroExit {
            code: exec.exit_code,
            output: exec.output,
        });
    }
    Ok(exec.output)
}
