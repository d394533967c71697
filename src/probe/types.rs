//! Probe request and result types.
//!
//! This module provides the uniform request/result envelope shared by every
//! probe, plus the probe-specific payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProbeError, ProbeErrorKind};

/// Kind of network check a request asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// DNS record lookup
    Dns,
    /// ICMP round-trip latency
    Latency,
    /// Download/upload bandwidth
    Throughput,
    /// IP geolocation
    Geo,
    /// Public (internet-facing) IP address
    PublicIp,
    /// Local (private) IP address
    LocalIp,
}

impl ProbeKind {
    /// Whether this kind contends for the network interface and should be
    /// serialized against other instances of itself.
    #[must_use]
    pub fn is_heavy(&self) -> bool {
        matches!(self, Self::Latency | Self::Throughput)
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dns => write!(f, "dns"),
            Self::Latency => write!(f, "latency"),
            Self::Throughput => write!(f, "throughput"),
            Self::Geo => write!(f, "geo"),
            Self::PublicIp => write!(f, "public_ip"),
            Self::LocalIp => write!(f, "local_ip"),
        }
    }
}

/// DNS record types supported by the DNS probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    #[default]
    A,
    Aaaa,
    Mx,
    Ns,
    Txt,
    Cname,
}

impl RecordType {
    /// Get all available record type names.
    #[must_use]
    pub fn names() -> &'static [&'static str] {
        &["A", "AAAA", "MX", "NS", "TXT", "CNAME"]
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "MX" => Ok(Self::Mx),
            "NS" => Ok(Self::Ns),
            "TXT" => Ok(Self::Txt),
            "CNAME" => Ok(Self::Cname),
            _ => Err(format!(
                "Unknown record type: {}. Valid options are: {:?}",
                s,
                Self::names()
            )),
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Mx => write!(f, "MX"),
            Self::Ns => write!(f, "NS"),
            Self::Txt => write!(f, "TXT"),
            Self::Cname => write!(f, "CNAME"),
        }
    }
}

/// Per-request options. Absent values fall back to the probe's configured
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Record type for DNS requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<RecordType>,
    /// Number of echo attempts for latency requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    /// Pause between echo attempts in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Probe-internal deadline in milliseconds (resolver deadline,
    /// per-attempt echo timeout or HTTP timeout depending on the kind)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A single probe request.
///
/// Requests are immutable once built; use the kind-specific constructors and
/// the consuming `with_*` builders.
///
/// # Example
///
/// ```ignore
/// let req = ProbeRequest::latency("example.com", 10)
///     .with_interval(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeRequest {
    kind: ProbeKind,
    #[serde(default)]
    target: String,
    #[serde(default)]
    options: ProbeOptions,
}

impl ProbeRequest {
    /// Create a request from raw parts.
    pub fn new(kind: ProbeKind, target: impl Into<String>, options: ProbeOptions) -> Self {
        Self {
            kind,
            target: target.into(),
            options,
        }
    }

    /// DNS lookup of `name` for `record_type`.
    pub fn dns(name: impl Into<String>, record_type: RecordType) -> Self {
        Self::new(
            ProbeKind::Dns,
            name,
            ProbeOptions {
                record_type: Some(record_type),
                ..ProbeOptions::default()
            },
        )
    }

    /// `count` sequential echo requests to `host`.
    pub fn latency(host: impl Into<String>, count: usize) -> Self {
        Self::new(
            ProbeKind::Latency,
            host,
            ProbeOptions {
                sample_count: Some(count),
                ..ProbeOptions::default()
            },
        )
    }

    /// Bandwidth test against the best available server.
    #[must_use]
    pub fn throughput() -> Self {
        Self::new(ProbeKind::Throughput, "", ProbeOptions::default())
    }

    /// Geolocation of an IP address or domain. An empty target locates the
    /// caller's own public address.
    pub fn geo(ip_or_domain: impl Into<String>) -> Self {
        Self::new(ProbeKind::Geo, ip_or_domain, ProbeOptions::default())
    }

    /// Public IP address of this machine.
    #[must_use]
    pub fn public_ip() -> Self {
        Self::new(ProbeKind::PublicIp, "", ProbeOptions::default())
    }

    /// Local (private) IP address of this machine.
    #[must_use]
    pub fn local_ip() -> Self {
        Self::new(ProbeKind::LocalIp, "", ProbeOptions::default())
    }

    /// Set the probe-internal timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the pause between echo attempts.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.options.interval_ms = Some(interval.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Probe-internal timeout, if the request overrides it.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout_ms.map(Duration::from_millis)
    }

    /// Echo interval, if the request overrides it.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.options.interval_ms.map(Duration::from_millis)
    }
}

/// Outcome status of a probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    Ok,
    Failed,
    TimedOut,
}

impl ProbeStatus {
    /// Check if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Records returned by a DNS lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecordSet {
    /// Queried name
    pub name: String,
    /// Queried record type
    pub record_type: RecordType,
    /// Rendered records, in resolver order
    pub records: Vec<String>,
}

/// Round-trip statistics over the successful echo attempts.
///
/// All figures are in milliseconds, rounded to 2 decimals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyReport {
    /// Successful round-trip times in attempt order
    pub samples: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; 0.0 with fewer than 2 samples
    pub jitter: f64,
    /// Echo requests sent
    pub sent: usize,
    /// Echo replies received
    pub received: usize,
    /// Packet loss ratio (0.0 = no loss, 1.0 = all lost)
    pub packet_loss: f64,
}

/// Measurement server metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    pub host: String,
    pub country: String,
}

/// Normalized bandwidth test result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThroughputReport {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub server: ServerInfo,
}

/// Geolocation of an address. Fields the upstream omits read `"N/A"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeoLocation {
    pub ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
    pub isp: String,
}

/// Which address an [`AddressReport`] describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AddressScope {
    Public,
    Local,
}

/// An address of this machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressReport {
    pub scope: AddressScope,
    pub ip: String,
    /// Loopback addresses are what sandboxed or offline hosts report
    pub is_loopback: bool,
}

/// Probe-specific success payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbePayload {
    Dns(DnsRecordSet),
    Latency(LatencyReport),
    Throughput(ThroughputReport),
    Geo(GeoLocation),
    Address(AddressReport),
}

/// Uniform outcome of one probe request.
///
/// A result is either `Ok` with a payload and no error, or `Failed`/`TimedOut`
/// with an error and no payload. The constructors are the only way to build
/// one, so the two halves can never disagree.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    request: ProbeRequest,
    status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<ProbePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ProbeErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    duration_ms: f64,
    completed_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Create a successful result.
    #[must_use]
    pub fn ok(request: ProbeRequest, payload: ProbePayload, duration: Duration) -> Self {
        Self {
            request,
            status: ProbeStatus::Ok,
            payload: Some(payload),
            error_kind: None,
            error_message: None,
            duration_ms: round2(duration.as_secs_f64() * 1000.0),
            completed_at: Utc::now(),
        }
    }

    /// Create a failed or timed-out result.
    #[must_use]
    pub fn failed(request: ProbeRequest, error: &ProbeError, duration: Duration) -> Self {
        Self {
            request,
            status: error.status(),
            payload: None,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            duration_ms: round2(duration.as_secs_f64() * 1000.0),
            completed_at: Utc::now(),
        }
    }

    /// Build a result from a probe outcome.
    #[must_use]
    pub fn from_outcome(
        request: ProbeRequest,
        outcome: std::result::Result<ProbePayload, ProbeError>,
        duration: Duration,
    ) -> Self {
        match outcome {
            Ok(payload) => Self::ok(request, payload, duration),
            Err(e) => Self::failed(request, &e, duration),
        }
    }

    #[must_use]
    pub fn request(&self) -> &ProbeRequest {
        &self.request
    }

    #[must_use]
    pub fn status(&self) -> ProbeStatus {
        self.status
    }

    #[must_use]
    pub fn payload(&self) -> Option<&ProbePayload> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ProbeErrorKind> {
        self.error_kind
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Wall-clock duration of the probe in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// View the result as a `Result`, forcing callers to handle failure.
    ///
    /// # Errors
    ///
    /// Returns the error message when the probe did not succeed.
    pub fn outcome(&self) -> std::result::Result<&ProbePayload, &str> {
        match (&self.payload, &self.error_message) {
            (Some(payload), None) => Ok(payload),
            (_, Some(msg)) => Err(msg),
            (None, None) => Err("missing payload"),
        }
    }
}

/// Round to 2 decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
