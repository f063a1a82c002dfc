use std::{path::PathBuf, sync::OnceLock};

use clap::{Parser, Subcommand};

/// Runs app.json healthchecks against running containers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the healthchecks declared for a container.
    Check(CheckArgs),
    /// Add a default healthcheck to an app.json file.
    Add(AddArgs),
    /// Exit successfully if a process type declares any healthchecks.
    Exists(ExistsArgs),
    /// Convert a legacy CHECKS file into app.json healthchecks.
    Convert(ConvertArgs),
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Container id or name.
    pub container: String,
    /// Path to the app.json file.
    #[arg(long, default_value = "app.json")]
    pub app_json: PathBuf,
    /// Process type whose healthchecks run.
    #[arg(long, default_value = "web")]
    pub process_type: String,
    /// Only run healthchecks of this type.
    #[arg(long, default_value = "startup")]
    pub check_type: String,
    /// Container port used by checks that declare none.
    #[arg(long, default_value_t = 5000)]
    pub port: u16,
    /// Network whose IP address path checks connect to.
    #[arg(long, default_value = "bridge")]
    pub network: String,
    /// Connect to this IP address instead of looking it up.
    #[arg(long)]
    pub ip_address: Option<String>,
    /// Extra header sent by every path check, as `Name: value`.
    #[arg(long = "header")]
    pub headers: Vec<String>,
    /// Pass when no healthchecks match instead of running an uptime check.
    #[arg(long)]
    pub no_default_check: bool,
    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Process type to add the healthcheck to.
    #[arg(default_value = "web")]
    pub process_type: String,
    /// Path to the app.json file. A missing file counts as empty.
    #[arg(long, default_value = "app.json")]
    pub app_json: PathBuf,
    /// Write back to the app.json file instead of stdout.
    #[arg(long)]
    pub in_place: bool,
    /// Only add when the process type has no healthchecks yet.
    #[arg(long)]
    pub if_empty: bool,
    /// Add a listening check instead of an uptime check.
    #[arg(long)]
    pub listening_check: bool,
    #[arg(long, default_value = "default")]
    pub name: String,
    #[arg(long = "type", default_value = "startup")]
    pub check_type: String,
    /// Port for the listening check.
    #[arg(long, default_value_t = 5000)]
    pub port: u16,
    /// Seconds of uptime for the uptime check.
    #[arg(long, default_value_t = 1)]
    pub uptime: i64,
    /// Failures only produce a warning.
    #[arg(long)]
    pub warn_only: bool,
    #[arg(long)]
    pub pretty: bool,
}

#[derive(clap::Args, Debug)]
pub struct ExistsArgs {
    pub process_type: String,
    /// Path to the app.json file. A missing file counts as empty.
    #[arg(long, default_value = "app.json")]
    pub app_json: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ConvertArgs {
    /// Path to the CHECKS file.
    pub checks_file: PathBuf,
    /// app.json file to merge the converted healthchecks into.
    #[arg(long)]
    pub app_json: Option<PathBuf>,
    #[arg(long)]
    pub pretty: bool,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
