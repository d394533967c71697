//! Error types module.
//!
//! Two layers of errors live here:
//!
//! - [`Error`] covers setup and plumbing failures (building probes, loading
//!   configuration, writing output). These are returned as `Result`s.
//! - [`ProbeError`] is the per-request failure taxonomy. It never escapes the
//!   orchestrator; it is folded into a [`ProbeResult`](crate::ProbeResult)
//!   instead.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::probe::types::ProbeStatus;

/// A specialized `Result` type for netprobe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for netprobe setup and I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, network sockets, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (configuration files, request batches, JSON output)
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// DNS resolver construction error
    #[error("DNS resolver error: {0}")]
    Resolver(#[from] trust_dns_resolver::error::ResolveError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network-related error (connection failures, socket setup)
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (invalid config, missing files)
    #[error("Config error: {0}")]
    Config(String),

    /// Operation timeout
    #[error("Operation timed out")]
    Timeout,
}

impl Error {
    /// Create a new network error with a message.
    #[must_use]
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new configuration error with a message.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<color_eyre::Report> for Error {
    fn from(e: color_eyre::Report) -> Self {
        Self::Config(e.to_string())
    }
}

/// Failure of a single probe request.
///
/// The `Display` output is the human-readable `error_message` stored in the
/// result, so every message is self-contained and safe to show verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The request itself was malformed (e.g. zero echo attempts).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The target host could not be resolved to an address.
    #[error("Invalid host: '{0}' could not be resolved to an address")]
    InvalidHost(String),

    /// NXDOMAIN: the name does not exist.
    #[error("Domain '{0}' does not exist")]
    NameNotFound(String),

    /// The name exists but has no records of the requested type.
    #[error("No {record_type} records found for '{name}'")]
    NoRecordsOfType { name: String, record_type: String },

    /// The probe's own deadline expired (e.g. resolver timeout).
    #[error("{0} timed out, please try again later")]
    Timeout(String),

    /// Any other resolver-level failure.
    #[error("DNS lookup failed: {0}")]
    ResolutionError(String),

    /// Every echo attempt failed.
    #[error("No valid ping responses received from '{0}': host unreachable or ICMP blocked")]
    NoResponses(String),

    /// The bandwidth measurement transaction failed at some step.
    #[error("Throughput test failed: {0}")]
    ThroughputTestFailed(String),

    /// Transport-level failure talking to an upstream HTTP service.
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered but reported the lookup as failed.
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// The orchestrator's per-probe deadline expired.
    #[error("Probe timed out after {} ms", .0.as_millis())]
    TimedOut(Duration),

    /// The probe task crashed.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable discriminant of a [`ProbeError`], suitable for matching and
/// serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeErrorKind {
    InvalidRequest,
    InvalidHost,
    NameNotFound,
    NoRecordsOfType,
    Timeout,
    ResolutionError,
    NoResponses,
    ThroughputTestFailed,
    UpstreamUnavailable,
    LookupFailed,
    TimedOut,
    Internal,
}

impl ProbeError {
    /// Get the discriminant of this error.
    #[must_use]
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            Self::InvalidRequest(_) => ProbeErrorKind::InvalidRequest,
            Self::InvalidHost(_) => ProbeErrorKind::InvalidHost,
            Self::NameNotFound(_) => ProbeErrorKind::NameNotFound,
            Self::NoRecordsOfType { .. } => ProbeErrorKind::NoRecordsOfType,
            Self::Timeout(_) => ProbeErrorKind::Timeout,
            Self::ResolutionError(_) => ProbeErrorKind::ResolutionError,
            Self::NoResponses(_) => ProbeErrorKind::NoResponses,
            Self::ThroughputTestFailed(_) => ProbeErrorKind::ThroughputTestFailed,
            Self::UpstreamUnavailable(_) => ProbeErrorKind::UpstreamUnavailable,
            Self::LookupFailed(_) => ProbeErrorKind::LookupFailed,
            Self::TimedOut(_) => ProbeErrorKind::TimedOut,
            Self::Internal(_) => ProbeErrorKind::Internal,
        }
    }

    /// Result status this error maps to.
    ///
    /// Deadline expiries (the probe's own or the orchestrator's) report
    /// `TimedOut`; everything else is `Failed`.
    #[must_use]
    pub fn status(&self) -> ProbeStatus {
        match self {
            Self::Timeout(_) | Self::TimedOut(_) => ProbeStatus::TimedOut,
            _ => ProbeStatus::Failed,
        }
    }
}
