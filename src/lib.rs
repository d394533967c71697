//! netprobe - A network probe orchestrator.
//!
//! This crate provides both a library API and a CLI tool for running batches
//! of network checks under one timeout and concurrency policy:
//! - DNS record lookups through the system resolver
//! - ICMP round-trip latency with min/max/mean/median/jitter
//! - Download/upload throughput against an HTTP speed test server
//! - IP geolocation through an ip-api.com compatible service
//! - Public and local address discovery
//!
//! Every request yields exactly one [`ProbeResult`]; failures are captured
//! per request and never abort the batch.
//!
//! # Library Usage
//!
//! ```ignore
//! use netprobe::{ConfigLoader, Orchestrator, ProbeRequest, RecordType};
//!
//! let settings = ConfigLoader::load_default()?;
//! let orchestrator = Orchestrator::from_settings(&settings)?;
//! let results = orchestrator
//!     .run(
//!         &[
//!             ProbeRequest::dns("example.com", RecordType::Mx),
//!             ProbeRequest::latency("example.com", 4),
//!             ProbeRequest::geo("1.1.1.1"),
//!         ],
//!         &settings.policy(),
//!     )
//!     .await;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! netprobe dns example.com --type MX
//! netprobe ping example.com --count 10
//! netprobe speed
//! netprobe geo 1.1.1.1
//! netprobe ip
//! netprobe batch requests.json --format json
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod probe;

// Re-export commonly used types
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{ConfigLoader, Settings};
pub use error::{Error, ProbeError, ProbeErrorKind, Result};
pub use orchestrator::{Orchestrator, ProgressEvent, RunPolicy};
pub use probe::types::{
    AddressReport, AddressScope, DnsRecordSet, GeoLocation, LatencyReport, ProbeKind,
    ProbeOptions, ProbePayload, ProbeRequest, ProbeResult, ProbeStatus, RecordType, ServerInfo,
    ThroughputReport,
};
pub use probe::{
    AddressProbe, BackendFactory, DnsProbe, EchoFacility, GeoProbe, HttpSpeedBackend, IcmpEcho,
    LatencyProbe, SpeedBackend, SpeedServer, ThroughputProbe,
};
