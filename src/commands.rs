//! Subcommand handlers. Each returns the process exit code.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use crate::appjson::{AppJson, AppJsonDocument, AppJsonError, HealthcheckEntry};
use crate::cli::{AddArgs, CheckArgs, ConvertArgs, ExistsArgs};
use crate::convert::ChecksFile;
use crate::healthcheck::ProbeDefaults;
use crate::healthcheck::probe::ProbeContext;
use crate::runner::{EmptyBatch, Runner};
use crate::runtime::ContainerRuntime;
use crate::runtime::docker::DockerRuntime;

pub async fn check(args: &CheckArgs) -> ExitCode {
    log::info!("Reading app.json file from {}", args.app_json.display());
    let app_json = match AppJson::read(&args.app_json) {
        Ok(app_json) => app_json,
        Err(e) => {
            log::error!("Unable to read app.json: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let context = match probe_context(args) {
        Ok(context) => context,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Fetching container {}", args.container);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime);
    let container = match runtime.inspect(&args.container).await {
        Ok(container) => container,
        Err(e) => {
            log::error!("Unable to inspect container {}: {}", args.container, e);
            return ExitCode::FAILURE;
        }
    };
    if !container.running {
        log::error!("Container state: {}", container.status);
        return ExitCode::FAILURE;
    }

    let empty_batch = if args.no_default_check {
        EmptyBatch::Pass
    } else {
        EmptyBatch::Substitute(default_check(&args.check_type))
    };
    let defaults = ProbeDefaults {
        port: args.port,
        ..Default::default()
    };

    let entries = app_json.healthchecks_for(&args.process_type, &args.check_type);
    let report = Runner::new(runtime)
        .with_defaults(defaults)
        .with_context(context)
        .with_empty_batch(empty_batch)
        .run(&container, &entries)
        .await;

    if !report.trigger_errors.is_empty() {
        log::warn!(
            "{} on failure triggers did not complete",
            report.trigger_errors.len()
        );
    }

    if args.json {
        match serde_json::to_string_pretty(&report.summary()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                log::error!("Unable to serialize results: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let blocking = report.failures().filter(|r| !r.warn_only).count();
    if blocking > 0 {
        log::error!("{} of {} healthchecks failed", blocking, report.results.len());
        return ExitCode::FAILURE;
    }
    log::info!("All healthchecks passed for container {}", args.container);
    ExitCode::SUCCESS
}

fn probe_context(args: &CheckArgs) -> Result<ProbeContext, crate::healthcheck::DefinitionError> {
    let headers = args
        .headers
        .iter()
        .map(|raw| ProbeContext::parse_header(raw))
        .collect::<Result<_, _>>()?;
    Ok(ProbeContext {
        network: args.network.clone(),
        ip_address: args.ip_address.clone(),
        headers,
    })
}

/// Runs when a process declares no healthchecks of the requested type.
fn default_check(check_type: &str) -> HealthcheckEntry {
    HealthcheckEntry {
        name: "default".to_string(),
        check_type: check_type.to_string(),
        uptime: Some(1),
        ..Default::default()
    }
}

pub fn add(args: &AddArgs) -> ExitCode {
    let mut document = match AppJsonDocument::read_or_default(&args.app_json) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Unable to read app.json: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = add_default_healthcheck(&mut document, args) {
        eprintln!("Unable to add healthcheck: {e}");
        return ExitCode::FAILURE;
    }

    let target = Some(args.app_json.as_path()).filter(|_| args.in_place);
    write_document(&document, args.pretty, target)
}

pub(crate) fn add_default_healthcheck(
    document: &mut AppJsonDocument,
    args: &AddArgs,
) -> Result<(), AppJsonError> {
    if args.if_empty && document.healthcheck_count(&args.process_type) > 0 {
        return Ok(());
    }

    let mut entry = HealthcheckEntry {
        name: args.name.clone(),
        check_type: args.check_type.clone(),
        warn: args.warn_only,
        ..Default::default()
    };
    if args.listening_check {
        entry.listening = true;
        entry.port = Some(args.port);
    } else {
        entry.uptime = Some(args.uptime);
    }
    document.append_healthcheck(&args.process_type, &entry)
}

pub fn exists(args: &ExistsArgs) -> ExitCode {
    let document = match AppJsonDocument::read_or_default(&args.app_json) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Unable to read app.json: {e}");
            return ExitCode::FAILURE;
        }
    };

    if document.healthcheck_count(&args.process_type) > 0 {
        return ExitCode::SUCCESS;
    }
    eprintln!(
        "No healthchecks found in app.json for {} process type",
        args.process_type
    );
    ExitCode::FAILURE
}

pub fn convert(args: &ConvertArgs) -> ExitCode {
    let contents = match std::fs::read_to_string(&args.checks_file) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Unable to read {}: {e}", args.checks_file.display());
            return ExitCode::FAILURE;
        }
    };
    let checks = match ChecksFile::parse(&contents) {
        Ok(checks) => checks,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut document = match read_document(args.app_json.as_deref()) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Unable to read app.json: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = document.set_healthchecks("web", &checks.to_healthchecks()) {
        eprintln!("Unable to update app.json: {e}");
        return ExitCode::FAILURE;
    }

    write_document(&document, args.pretty, args.app_json.as_deref())
}

fn read_document(path: Option<&Path>) -> Result<AppJsonDocument, AppJsonError> {
    match path {
        Some(path) => AppJsonDocument::read_or_default(path),
        None => Ok(AppJsonDocument::default()),
    }
}

/// Writes to `target` when given, otherwise prints to stdout.
fn write_document(document: &AppJsonDocument, pretty: bool, target: Option<&Path>) -> ExitCode {
    let bytes = match document.to_bytes(pretty) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Unable to serialize app.json: {e}");
            return ExitCode::FAILURE;
        }
    };

    match target {
        Some(path) => {
            if let Err(e) = std::fs::write(path, bytes) {
                eprintln!("Unable to write {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => println!("{}", String::from_utf8_lossy(&bytes)),
    }
    ExitCode::SUCCESS
}
