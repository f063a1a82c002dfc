use std::process::ExitCode;

use cli::Command;

mod appjson;
mod cli;
mod commands;
mod convert;
mod healthcheck;
mod runner;
mod runtime;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match &cli::get_cli_args().command {
        Command::Check(args) => commands::check(args).await,
        Command::Add(args) => commands::add(args),
        Command::Exists(args) => commands::exists(args),
        Command::Convert(args) => commands::convert(args),
    }
}
