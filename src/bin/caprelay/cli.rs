use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use humantime::parse_duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "SASMEX CAP alert feed relay", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run a single fetch cycle and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub once: bool,

    /// Override the poll interval (e.g. "1s").
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Override the HTTP bind address.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Log what would be delivered without calling any sink.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Use a JSON log layer (`--features json-logs`).
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_logs: bool,

    /// Explicit log filter (e.g. "caprelay=debug").
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
