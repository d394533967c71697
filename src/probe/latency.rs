//! Round-trip latency using ICMP echo.
//!
//! Echo requests are sent one at a time with a pause between them. Running
//! them in parallel trips rate limiting on many hosts and scrambles the
//! sample order that jitter is computed over.

#![allow(clippy::missing_errors_doc)]

use crate::error::{Error, ProbeError, Result};
use crate::probe::types::{round2, LatencyReport, ProbePayload, ProbeRequest, ProbeResult};
use futures::future::BoxFuture;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

/// Default packet size for ping in bytes.
const DEFAULT_PACKET_SIZE: usize = 32;

/// Default timeout for each echo attempt in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// Default number of echo attempts.
pub const DEFAULT_PING_COUNT: usize = 4;

/// Default pause between attempts in milliseconds.
const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Something that can send one echo request and time the reply.
pub trait EchoFacility: Send + Sync {
    /// Send one echo to `addr` and return the round-trip time.
    fn ping(&self, addr: IpAddr, seq: u16, timeout: Duration)
        -> BoxFuture<'_, Result<Duration>>;
}

/// ICMP echo over `surge-ping` sockets.
///
/// Opening ICMP sockets needs raw socket access or an unprivileged ICMP
/// sysctl. When a socket cannot be opened the facility still builds, and
/// every attempt for that address family fails.
pub struct IcmpEcho {
    v4: Option<Client>,
    v6: Option<Client>,
}

impl IcmpEcho {
    /// Open ICMP sockets for both address families.
    #[must_use]
    pub fn new() -> Self {
        let v4 = Client::new(&Config::default())
            .map_err(|e| tracing::warn!("ICMPv4 socket unavailable: {e}"))
            .ok();
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .map_err(|e| tracing::debug!("ICMPv6 socket unavailable: {e}"))
            .ok();
        Self { v4, v6 }
    }
}

impl Default for IcmpEcho {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoFacility for IcmpEcho {
    fn ping(
        &self,
        addr: IpAddr,
        seq: u16,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Duration>> {
        Box::pin(async move {
            let client = if addr.is_ipv4() { &self.v4 } else { &self.v6 };
            let client = client
                .as_ref()
                .ok_or_else(|| Error::network("ICMP socket unavailable (permission denied?)"))?;

            let payload = [0u8; DEFAULT_PACKET_SIZE];
            let mut pinger = client.pinger(addr, PingIdentifier(rand_id())).await;
            pinger.timeout(timeout);

            match tokio::time::timeout(timeout, pinger.ping(PingSequence(seq), &payload)).await {
                Ok(Ok((_packet, rtt))) => Ok(rtt),
                Ok(Err(e)) => Err(Error::network(e.to_string())),
                Err(_) => Err(Error::Timeout),
            }
        })
    }
}

/// Latency probe.
///
/// # Example
///
/// ```ignore
/// let probe = LatencyProbe::new(Arc::new(IcmpEcho::new()));
/// let result = probe.measure("example.com", 4, Duration::from_secs(1), Duration::from_secs(2)).await;
/// ```
pub struct LatencyProbe {
    echo: Arc<dyn EchoFacility>,
    count: usize,
    interval: Duration,
    timeout: Duration,
}

impl LatencyProbe {
    /// Create a latency probe with default settings.
    pub fn new(echo: Arc<dyn EchoFacility>) -> Self {
        Self::with_settings(
            echo,
            DEFAULT_PING_COUNT,
            Duration::from_millis(DEFAULT_INTERVAL_MS),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a latency probe with custom defaults for requests that do not
    /// override them.
    pub fn with_settings(
        echo: Arc<dyn EchoFacility>,
        count: usize,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            echo,
            count,
            interval,
            timeout,
        }
    }

    /// Run a latency request, filling unset options from the defaults.
    pub async fn run(&self, request: ProbeRequest) -> ProbeResult {
        let count = request.options().sample_count.unwrap_or(self.count);
        let interval = request.interval().unwrap_or(self.interval);
        let timeout = request.timeout().unwrap_or(self.timeout);

        let start = Instant::now();
        let outcome = self
            .sample(request.target(), count, interval, timeout)
            .await
            .map(ProbePayload::Latency);
        ProbeResult::from_outcome(request, outcome, start.elapsed())
    }

    /// Measure latency to `host` and wrap the outcome in a result.
    pub async fn measure(
        &self,
        host: &str,
        count: usize,
        interval: Duration,
        per_attempt_timeout: Duration,
    ) -> ProbeResult {
        let request = ProbeRequest::latency(host, count)
            .with_interval(interval)
            .with_timeout(per_attempt_timeout);
        self.run(request).await
    }

    /// Send `count` sequential echoes and compute the statistics.
    pub async fn sample(
        &self,
        host: &str,
        count: usize,
        interval: Duration,
        per_attempt_timeout: Duration,
    ) -> std::result::Result<LatencyReport, ProbeError> {
        if count == 0 {
            return Err(ProbeError::InvalidRequest(
                "echo count must be at least 1".into(),
            ));
        }

        // Resolve before the first echo so a typo costs one lookup, not
        // `count` timeouts.
        let addr = resolve_host(host).await?;
        tracing::debug!("Pinging {host} ({addr}) {count} times");

        let mut samples = Vec::with_capacity(count);
        for seq in 0..count {
            if seq > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }

            match self.echo.ping(addr, seq as u16, per_attempt_timeout).await {
                Ok(rtt) => samples.push(rtt.as_secs_f64() * 1000.0),
                Err(e) => tracing::debug!("Ping {seq} to {addr} failed: {e}"),
            }
        }

        LatencyReport::from_samples(samples, count)
            .ok_or_else(|| ProbeError::NoResponses(host.to_string()))
    }
}

impl LatencyReport {
    /// Compute statistics over the successful samples.
    ///
    /// Returns `None` when there are no samples.
    #[must_use]
    pub fn from_samples(samples: Vec<f64>, sent: usize) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = samples.iter().sum::<f64>() / n as f64;

        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let jitter = if n < 2 {
            0.0
        } else {
            let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        };

        let sent = sent.max(n);
        Some(Self {
            samples,
            min: round2(min),
            max: round2(max),
            mean: round2(mean),
            median: round2(median),
            jitter: round2(jitter),
            sent,
            received: n,
            packet_loss: 1.0 - (n as f64 / sent as f64),
        })
    }
}

/// Resolve a host name or literal address to the first address.
async fn resolve_host(host: &str) -> std::result::Result<IpAddr, ProbeError> {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    if host.is_empty() {
        return Err(ProbeError::InvalidHost(host.to_string()));
    }

    tokio::net::lookup_host((host, 0))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::InvalidHost(host.to_string()))
}

/// Generate a random ping identifier.
fn rand_id() -> u16 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    (nanos % 65536) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeErrorKind;
    use crate::probe::types::ProbeStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Echo facility replaying a fixed script of outcomes.
    struct ScriptedEcho {
        script: Mutex<Vec<Option<u64>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEcho {
        fn new(script: Vec<Option<u64>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl EchoFacility for ScriptedEcho {
        fn ping(&self, _: IpAddr, seq: u16, _: Duration) -> BoxFuture<'_, Result<Duration>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().get(seq as usize).copied().flatten();
            Box::pin(async move { next.map(Duration::from_millis).ok_or(Error::Timeout) })
        }
    }

    #[test]
    fn test_stats_single_sample() {
        let report = LatencyReport::from_samples(vec![12.5], 4).unwrap();
        assert_eq!(report.jitter, 0.0);
        assert_eq!(report.min, 12.5);
        assert_eq!(report.median, 12.5);
        assert_eq!(report.received, 1);
        assert_eq!(report.packet_loss, 0.75);
    }

    #[test]
    fn test_stats_distribution() {
        let report = LatencyReport::from_samples(vec![10.0, 20.0, 30.0, 40.0], 4).unwrap();
        assert_eq!(report.min, 10.0);
        assert_eq!(report.max, 40.0);
        assert_eq!(report.mean, 25.0);
        assert_eq!(report.median, 25.0);
        // Sample stdev of 10,20,30,40 = sqrt(500/3)
        assert_eq!(report.jitter, 12.91);
        assert_eq!(report.packet_loss, 0.0);
        assert_eq!(report.samples, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_stats_empty() {
        assert!(LatencyReport::from_samples(vec![], 3).is_none());
    }

    #[tokio::test]
    async fn test_partial_failures_keep_going() {
        let echo = ScriptedEcho::new(vec![None, Some(10), None, Some(20)]);
        let probe = LatencyProbe::new(echo.clone());
        let result = probe
            .measure("127.0.0.1", 4, Duration::ZERO, Duration::from_millis(100))
            .await;

        assert_eq!(echo.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.status(), ProbeStatus::Ok);
        match result.payload() {
            Some(ProbePayload::Latency(report)) => {
                assert_eq!(report.samples, vec![10.0, 20.0]);
                assert_eq!(report.sent, 4);
                assert_eq!(report.received, 2);
                assert_eq!(report.jitter, 7.07);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_responses() {
        let echo = ScriptedEcho::new(vec![None, None, None]);
        let probe = LatencyProbe::new(echo);
        let result = probe
            .measure("127.0.0.1", 3, Duration::ZERO, Duration::from_millis(100))
            .await;

        assert_eq!(result.status(), ProbeStatus::Failed);
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::NoResponses));
        assert!(result.error_message().unwrap().contains("ICMP blocked"));
    }

    #[tokio::test]
    async fn test_invalid_host_sends_nothing() {
        let echo = ScriptedEcho::new(vec![Some(1)]);
        let probe = LatencyProbe::new(echo.clone());
        let result = probe
            .measure(
                "definitely-not-a-real-domain-xyz123.invalid",
                3,
                Duration::ZERO,
                Duration::from_millis(100),
            )
            .await;

        assert_eq!(result.error_kind(), Some(ProbeErrorKind::InvalidHost));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_count_rejected() {
        let probe = LatencyProbe::new(ScriptedEcho::new(vec![]));
        let result = probe
            .measure("127.0.0.1", 0, Duration::ZERO, Duration::from_millis(100))
            .await;
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_interval_between_attempts_only() {
        let probe = LatencyProbe::new(ScriptedEcho::new(vec![Some(1), Some(1), Some(1)]));
        let start = Instant::now();
        let result = probe
            .measure("127.0.0.1", 3, Duration::from_millis(50), Duration::from_millis(100))
            .await;
        let elapsed = start.elapsed();

        assert_eq!(result.status(), ProbeStatus::Ok);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150 + 500));
    }

    #[tokio::test]
    async fn test_ping_localhost() {
        // This test requires ICMP socket permissions which are not available in CI
        if std::env::var("CI").is_ok() {
            return;
        }

        let probe = LatencyProbe::new(Arc::new(IcmpEcho::new()));
        let result = probe
            .measure("127.0.0.1", 2, Duration::ZERO, Duration::from_secs(1))
            .await;

        if let Some(ProbePayload::Latency(report)) = result.payload() {
            assert!(report.max < 100.0);
        }
    }
}
