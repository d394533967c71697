//! netprobe - network probe orchestrator
//!
//! Binary entry point for the netprobe CLI application.

#![warn(clippy::all, warnings)]
#![warn(clippy::pedantic, clippy::nursery)]

use clap::CommandFactory;
use netprobe::cli::{Cli, Commands, OutputFormat};
use netprobe::config::{ConfigLoader, Settings};
use netprobe::error::Result;
use netprobe::orchestrator::{Orchestrator, ProgressEvent};
use netprobe::probe::types::{ProbePayload, ProbeRequest, ProbeResult};
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set up logging based on verbosity level.
///
/// Logs go to stderr so JSON and CSV output on stdout stay parseable.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging
/// * `quiet` - Enable error-level only logging
fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    } else if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().without_time().with_writer(std::io::stderr))
        .init();
}

/// Load settings and apply command-line overrides.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = ConfigLoader::load(cli.config.as_deref())?;
    Ok(apply_overrides(settings, cli))
}

/// Apply the global `--concurrency` and `--timeout` flags.
fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(concurrency) = cli.concurrency {
        settings.max_concurrency = concurrency;
    }
    if let Some(secs) = cli.timeout {
        settings.per_probe_timeout_ms = secs.saturating_mul(1000);
    }
    settings
}

/// Run requests through the orchestrator and print the results.
///
/// # Arguments
///
/// * `settings` - Effective settings
/// * `requests` - Requests to run
/// * `format` - Output format
/// * `quiet` - Suppress progress lines
async fn run_probes(
    settings: &Settings,
    requests: &[ProbeRequest],
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    let total = requests.len();
    let show_progress = !quiet && format == OutputFormat::Table;

    let results = orchestrator
        .run_with_progress(requests, &settings.policy(), |event| {
            if !show_progress {
                return;
            }
            if let ProgressEvent::Started {
                index,
                kind,
                target,
            } = event
            {
                eprintln!("[{:>2}/{}] running {} {}", index + 1, total, kind, target);
            }
        })
        .await;

    match format {
        OutputFormat::Table => print_results_table(&results),
        OutputFormat::Json => print_results_json(&results)?,
        OutputFormat::Csv => print_results_csv(&results),
    }

    Ok(())
}

/// Print results in human-readable format.
fn print_results_table(results: &[ProbeResult]) {
    for (idx, r) in results.iter().enumerate() {
        let req = r.request();
        println!(
            "\n#{} {} {}  [{}] ({:.1} ms)",
            idx + 1,
            req.kind(),
            req.target(),
            r.status(),
            r.duration_ms()
        );

        match r.outcome() {
            Ok(payload) => print_payload(payload),
            Err(msg) => println!("  {msg}"),
        }
    }
}

fn print_payload(payload: &ProbePayload) {
    match payload {
        ProbePayload::Dns(set) => {
            println!("  {} records for {}:", set.record_type, set.name);
            for record in &set.records {
                println!("    {record}");
            }
        }
        ProbePayload::Latency(report) => {
            println!(
                "  {} sent, {} received, {:.0}% loss",
                report.sent,
                report.received,
                report.packet_loss * 100.0
            );
            println!("  Min:    {:.2} ms", report.min);
            println!("  Avg:    {:.2} ms", report.mean);
            println!("  Max:    {:.2} ms", report.max);
            println!("  Median: {:.2} ms", report.median);
            println!("  Jitter: {:.2} ms", report.jitter);
            let samples: Vec<String> = report.samples.iter().map(|s| format!("{s:.1}")).collect();
            println!("  Samples: {}", samples.join(", "));
        }
        ProbePayload::Throughput(report) => {
            println!("  Download: {:.2} Mbps", report.download_mbps);
            println!("  Upload:   {:.2} Mbps", report.upload_mbps);
            println!("  Ping:     {:.2} ms", report.ping_ms);
            println!(
                "  Server:   {} ({})",
                report.server.host, report.server.country
            );
        }
        ProbePayload::Geo(geo) => {
            println!("  IP:        {}", geo.ip);
            println!("  Country:   {}", geo.country);
            println!("  Region:    {}", geo.region);
            println!("  City:      {}", geo.city);
            println!("  Latitude:  {}", geo.latitude);
            println!("  Longitude: {}", geo.longitude);
            println!("  ISP:       {}", geo.isp);
        }
        ProbePayload::Address(addr) => {
            println!("  {:?} IP: {}", addr.scope, addr.ip);
            if addr.is_loopback {
                println!("  (loopback address: no usable network interface found)");
            }
        }
    }
}

/// Print results in JSON format.
fn print_results_json(results: &[ProbeResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    println!("{json}");
    Ok(())
}

/// Print results in CSV format.
fn print_results_csv(results: &[ProbeResult]) {
    println!("#Idx,Kind,Target,Status,Duration(ms),Summary");
    for (idx, r) in results.iter().enumerate() {
        let summary = match r.outcome() {
            Ok(payload) => summarize(payload),
            Err(msg) => msg.to_string(),
        };
        println!(
            "{},{},{},{},{:.1},\"{}\"",
            idx + 1,
            r.request().kind(),
            r.request().target(),
            r.status(),
            r.duration_ms(),
            summary.replace('"', "\"\"")
        );
    }
}

/// One-line summary of a payload.
fn summarize(payload: &ProbePayload) -> String {
    match payload {
        ProbePayload::Dns(set) => set.records.join("; "),
        ProbePayload::Latency(r) => format!(
            "min={:.2} avg={:.2} max={:.2} median={:.2} jitter={:.2}",
            r.min, r.mean, r.max, r.median, r.jitter
        ),
        ProbePayload::Throughput(r) => format!(
            "down={:.2}Mbps up={:.2}Mbps ping={:.2}ms server={}",
            r.download_mbps, r.upload_mbps, r.ping_ms, r.server.host
        ),
        ProbePayload::Geo(g) => format!(
            "{} {}, {}, {} ({}, {}) {}",
            g.ip, g.city, g.region, g.country, g.latitude, g.longitude, g.isp
        ),
        ProbePayload::Address(a) => a.ip.clone(),
    }
}

/// Show or store the effective settings.
fn run_config(settings: &Settings, write: bool) -> Result<()> {
    if write {
        let path = ConfigLoader::settings_path();
        ConfigLoader::save(settings, &path)?;
        println!("Settings written to: {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(settings)?);
    }
    Ok(())
}

/// Main entry point for the netprobe CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (cli, verbose) = netprobe::cli::parse_verbose();
    setup_logging(verbose, cli.quiet);

    tracing::debug!("netprobe starting...");

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "netprobe", &mut std::io::stdout());
        return Ok(());
    }

    let settings = load_settings(&cli)?;

    match &cli.command {
        Commands::Config { write } => run_config(&settings, *write)?,
        Commands::Batch { file } => {
            let requests = ConfigLoader::load_requests(file)?;
            run_probes(&settings, &requests, cli.format, cli.quiet).await?;
        }
        command => {
            let requests = command.requests().unwrap_or_default();
            let mut settings = settings;
            // A throughput run routinely outlasts the default deadline
            if matches!(command, Commands::Speed) && cli.timeout.is_none() {
                settings.per_probe_timeout_ms = settings
                    .per_probe_timeout_ms
                    .max(Duration::from_secs(120).as_millis() as u64);
            }
            run_probes(&settings, &requests, cli.format, cli.quiet).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from(["netprobe", "--concurrency", "2", "--timeout", "5", "ip"])
            .unwrap();
        let settings = apply_overrides(Settings::default(), &cli);
        assert_eq!(settings.max_concurrency, 2);
        assert_eq!(settings.per_probe_timeout_ms, 5000);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let max = u64::MAX.to_string();
        let cli = Cli::try_parse_from(["netprobe", "--timeout", max.as_str(), "ip"]).unwrap();
        let settings = apply_overrides(Settings::default(), &cli);
        assert_eq!(settings.per_probe_timeout_ms, u64::MAX);
    }
}
