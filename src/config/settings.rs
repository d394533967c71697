//! Probe settings.
//!
//! Every field has a default, so a settings file only needs the values it
//! changes.

use crate::orchestrator::{RunPolicy, DEFAULT_MAX_CONCURRENCY, DEFAULT_PER_PROBE_TIMEOUT_SECS};
use crate::probe::address::DEFAULT_PUBLIC_IP_URL;
use crate::probe::geo::DEFAULT_BASE_URL;
use crate::probe::latency::DEFAULT_PING_COUNT;
use crate::probe::throughput::{SpeedServer, DEFAULT_DOWNLOAD_BYTES, DEFAULT_UPLOAD_BYTES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Netprobe settings, usually loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Resolver deadline for DNS lookups
    pub dns_timeout_ms: u64,
    /// Echo attempts per latency probe
    pub ping_count: usize,
    /// Pause between echo attempts
    pub ping_interval_ms: u64,
    /// Deadline for each echo attempt
    pub ping_timeout_ms: u64,
    /// Geolocation service base URL (ip-api.com compatible)
    pub geo_base_url: String,
    /// Geolocation request timeout
    pub geo_timeout_ms: u64,
    /// Public IP echo service URL (ipify compatible)
    pub public_ip_url: String,
    /// Public IP request timeout
    pub public_ip_timeout_ms: u64,
    /// Candidate servers for the throughput probe
    pub speed_servers: Vec<SpeedServer>,
    /// Download transfer size in bytes
    pub speed_download_bytes: u64,
    /// Upload transfer size in bytes
    pub speed_upload_bytes: u64,
    /// User agent for every HTTP request
    pub user_agent: String,
    /// Probes allowed to run at the same time
    pub max_concurrency: usize,
    /// Orchestrator deadline per probe
    pub per_probe_timeout_ms: u64,
    /// Concurrent instances allowed per heavy kind (latency, throughput)
    pub heavy_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dns_timeout_ms: 5_000,
            ping_count: DEFAULT_PING_COUNT,
            ping_interval_ms: 1_000,
            ping_timeout_ms: 2_000,
            geo_base_url: DEFAULT_BASE_URL.to_string(),
            geo_timeout_ms: 10_000,
            public_ip_url: DEFAULT_PUBLIC_IP_URL.to_string(),
            public_ip_timeout_ms: 10_000,
            speed_servers: vec![SpeedServer::default()],
            speed_download_bytes: DEFAULT_DOWNLOAD_BYTES,
            speed_upload_bytes: DEFAULT_UPLOAD_BYTES,
            user_agent: concat!("netprobe/", env!("CARGO_PKG_VERSION")).to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            per_probe_timeout_ms: DEFAULT_PER_PROBE_TIMEOUT_SECS * 1000,
            heavy_concurrency: 1,
        }
    }
}

impl Settings {
    /// Scheduling policy derived from these settings.
    #[must_use]
    pub fn policy(&self) -> RunPolicy {
        RunPolicy {
            max_concurrency: self.max_concurrency,
            per_probe_timeout: Duration::from_millis(self.per_probe_timeout_ms),
            heavy_concurrency: self.heavy_concurrency,
        }
    }

    #[must_use]
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    #[must_use]
    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }

    #[must_use]
    pub fn public_ip_timeout(&self) -> Duration {
        Duration::from_millis(self.public_ip_timeout_ms)
    }
}
