//! Public and local address discovery.

#![allow(clippy::missing_errors_doc)]

use crate::error::ProbeError;
use crate::probe::types::{
    AddressReport, AddressScope, ProbeKind, ProbePayload, ProbeRequest, ProbeResult,
};
use serde_json::Value;
use std::net::{IpAddr, UdpSocket};
use std::time::{Duration, Instant};

/// Default public-IP echo service.
pub const DEFAULT_PUBLIC_IP_URL: &str = "https://api64.ipify.org?format=json";

/// Routable address used to pick the outbound interface. Nothing is sent.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Address probe.
pub struct AddressProbe {
    client: reqwest::Client,
    public_ip_url: String,
    timeout: Duration,
}

impl AddressProbe {
    pub fn new(
        client: reqwest::Client,
        public_ip_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            public_ip_url: public_ip_url.into(),
            timeout,
        }
    }

    /// Run a public or local address request.
    pub async fn run(&self, request: ProbeRequest) -> ProbeResult {
        let start = Instant::now();
        let outcome = match request.kind() {
            ProbeKind::LocalIp => local_ip(),
            _ => self.public_ip(request.timeout().unwrap_or(self.timeout)).await,
        }
        .map(ProbePayload::Address);
        ProbeResult::from_outcome(request, outcome, start.elapsed())
    }

    /// Ask the echo service which address our requests come from.
    pub async fn public_ip(
        &self,
        timeout: Duration,
    ) -> std::result::Result<AddressReport, ProbeError> {
        let body: Value = self
            .client
            .get(&self.public_ip_url)
            .timeout(timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProbeError::UpstreamUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProbeError::UpstreamUnavailable(format!("malformed response: {e}")))?;

        let ip: IpAddr = body
            .get("ip")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProbeError::LookupFailed("no IP address in response".into()))?;

        Ok(AddressReport {
            scope: AddressScope::Public,
            ip: ip.to_string(),
            is_loopback: ip.is_loopback(),
        })
    }
}

/// Source address the OS would use for outbound traffic.
///
/// Connecting a UDP socket only selects a route; no packet leaves the host.
pub fn local_ip() -> std::result::Result<AddressReport, ProbeError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| s.connect(ROUTE_PROBE_ADDR).map(|()| s))
        .map_err(|e| ProbeError::ResolutionError(format!("no outbound route: {e}")))?;
    let ip = socket
        .local_addr()
        .map_err(|e| ProbeError::ResolutionError(e.to_string()))?
        .ip();

    Ok(AddressReport {
        scope: AddressScope::Local,
        ip: ip.to_string(),
        is_loopback: ip.is_loopback(),
    })
}
