use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use hostbridge_transport::DEFAULT_PORT;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge server with the demonstration host.
    Serve(ServeArgs),
    /// Send one command and print its result.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "HOSTBRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Port to bind (0 picks a free port).
    #[arg(long, env = "HOSTBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Directory of `<method>.schema.json` files for params validation.
    #[arg(long, value_name = "DIR")]
    pub schemas: Option<PathBuf>,
    /// Refuse connections beyond this many concurrent clients.
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Command name.
    pub method: String,
    /// Params as a JSON object.
    #[arg(long, default_value = "{}")]
    pub params: String,
    /// Server address.
    #[arg(long, env = "HOSTBRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(long, env = "HOSTBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Maximum time to wait for the result (e.g. 30s, 500ms).
    #[arg(long, env = "HOSTBRIDGE_TIMEOUT", default_value = "120s")]
    pub timeout: String,
    /// Maximum time to establish the connection.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Send as a notification and do not wait for a result.
    #[arg(long)]
    pub notify: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start async runtime: {err}")))
}
