//! Command-line interface (CLI) argument parsing module.
//!
//! This module provides CLI argument parsing using `clap`.
//! Each probe kind has its own command; `batch` runs a JSON list of
//! requests through the orchestrator.

use crate::probe::types::{ProbeKind, ProbeOptions, ProbeRequest, RecordType};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI argument parser using clap derive macro.
///
/// # Example
///
/// ```ignore
/// let cli = Cli::parse();
/// match cli.command {
///     Commands::Dns { domain, record_type } => { /* ... */ }
///     Commands::Batch { file } => { /* ... */ }
///     _ => { /* ... */ }
/// }
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "netprobe",
    version,
    about = "Network probe orchestrator",
    long_about = "Run DNS, latency, throughput and geolocation checks with uniform results",
    infer_subcommands = true
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Settings file (JSON); defaults to the user config directory
    #[arg(long, global = true, env = "NETPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum probes running at the same time
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Per-probe deadline in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Table,
    /// JSON array of results
    Json,
    /// One CSV row per result
    Csv,
}

impl OutputFormat {
    /// Get all available output format names.
    #[must_use]
    pub fn names() -> &'static [&'static str] {
        &["table", "json", "csv"]
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(format!(
                "Unknown format: {}. Valid options are: {:?}",
                s,
                Self::names()
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Available commands for the netprobe CLI.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Look up DNS records
    #[command(alias = "d")]
    Dns {
        /// Domain to query
        domain: String,

        /// Record type (A, AAAA, MX, NS, TXT, CNAME)
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: RecordType,
    },

    /// Measure ICMP round-trip latency
    ///
    /// Echo requests are sent one after another, never in parallel.
    #[command(alias = "p")]
    Ping {
        /// Host name or IP address (default: google.com)
        #[arg(default_value = "google.com")]
        host: String,

        /// Number of echo requests
        #[arg(short, long)]
        count: Option<usize>,

        /// Pause between echo requests in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Timeout per echo request in milliseconds
        #[arg(short = 'W', long = "wait")]
        wait: Option<u64>,
    },

    /// Measure download/upload throughput
    #[command(alias = "s")]
    Speed,

    /// Geolocate an IP address or domain (default: this machine)
    #[command(alias = "g")]
    Geo {
        /// IP address or domain
        #[arg(default_value = "")]
        target: String,
    },

    /// Show public and local IP addresses
    Ip,

    /// Run a batch of requests from a JSON file
    ///
    /// The file holds an array like
    /// `[{"kind": "dns", "target": "example.com", "options": {"record_type": "MX"}}]`.
    #[command(alias = "b")]
    Batch {
        /// Request file (JSON)
        file: PathBuf,
    },

    /// Show the effective settings
    Config {
        /// Write them to the default settings file
        #[arg(long)]
        write: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// Requests this command runs, or `None` for commands that do not probe.
    #[must_use]
    pub fn requests(&self) -> Option<Vec<ProbeRequest>> {
        match self {
            Self::Dns {
                domain,
                record_type,
            } => Some(vec![ProbeRequest::dns(domain.as_str(), *record_type)]),
            Self::Ping {
                host,
                count,
                interval,
                wait,
            } => {
                let options = ProbeOptions {
                    sample_count: *count,
                    interval_ms: *interval,
                    timeout_ms: *wait,
                    ..ProbeOptions::default()
                };
                Some(vec![ProbeRequest::new(
                    ProbeKind::Latency,
                    host.as_str(),
                    options,
                )])
            }
            Self::Speed => Some(vec![ProbeRequest::throughput()]),
            Self::Geo { target } => Some(vec![ProbeRequest::geo(target.as_str())]),
            Self::Ip => Some(vec![ProbeRequest::public_ip(), ProbeRequest::local_ip()]),
            Self::Batch { .. } | Self::Config { .. } | Self::Completions { .. } => None,
        }
    }
}

/// Parse CLI arguments and return verbose flag.
///
/// # Returns
///
/// Returns a tuple of `(Cli, verbose)` where `verbose` indicates
/// whether verbose logging was enabled.
#[must_use]
pub fn parse_verbose() -> (Cli, bool) {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    (cli, verbose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("csv".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_parse_dns_command() {
        let cli = Cli::try_parse_from(["netprobe", "dns", "example.com", "-t", "mx"]).unwrap();
        let requests = cli.command.requests().unwrap();
        assert_eq!(requests, vec![ProbeRequest::dns("example.com", RecordType::Mx)]);
    }

    #[test]
    fn test_parse_ping_command() {
        let cli = Cli::try_parse_from([
            "netprobe", "--format", "json", "ping", "1.1.1.1", "-c", "3", "-i", "200",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);

        let requests = cli.command.requests().unwrap();
        assert_eq!(requests[0].kind(), ProbeKind::Latency);
        assert_eq!(requests[0].options().sample_count, Some(3));
        assert_eq!(requests[0].interval(), Some(Duration::from_millis(200)));
        assert_eq!(requests[0].timeout(), None);
    }

    #[test]
    fn test_ping_defaults_leave_options_unset() {
        let cli = Cli::try_parse_from(["netprobe", "ping"]).unwrap();
        let requests = cli.command.requests().unwrap();
        assert_eq!(requests[0].target(), "google.com");
        assert_eq!(requests[0].options().sample_count, None);
    }

    #[test]
    fn test_ip_command_runs_two_probes() {
        let cli = Cli::try_parse_from(["netprobe", "ip"]).unwrap();
        let kinds: Vec<_> = cli
            .command
            .requests()
            .unwrap()
            .iter()
            .map(ProbeRequest::kind)
            .collect();
        assert_eq!(kinds, vec![ProbeKind::PublicIp, ProbeKind::LocalIp]);
    }

    #[test]
    fn test_bad_record_type_rejected() {
        assert!(Cli::try_parse_from(["netprobe", "dns", "example.com", "-t", "SRV"]).is_err());
    }
}
