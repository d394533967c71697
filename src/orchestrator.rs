//! Batch probe runner.
//!
//! The orchestrator takes a list of requests, runs each one in its own task
//! under a concurrency limit and a per-probe deadline, and returns one
//! result per request in request order. A failing, panicking or hung probe
//! only ever affects its own slot.

#![allow(clippy::missing_panics_doc)]

use crate::config::Settings;
use crate::error::{ProbeError, Result};
use crate::probe::types::{ProbeKind, ProbeRequest, ProbeResult, ProbeStatus};
use crate::probe::{
    AddressProbe, DnsProbe, GeoProbe, HttpSpeedBackend, IcmpEcho, LatencyProbe, ThroughputProbe,
};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};

/// Default number of probes in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default per-probe deadline in seconds.
pub const DEFAULT_PER_PROBE_TIMEOUT_SECS: u64 = 60;

/// Scheduling policy for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPolicy {
    /// Probes allowed to run at the same time (0 is treated as 1)
    pub max_concurrency: usize,
    /// Deadline for each probe, measured from when it starts running
    pub per_probe_timeout: Duration,
    /// Concurrent instances allowed per heavy kind (latency, throughput)
    pub heavy_concurrency: usize,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            per_probe_timeout: Duration::from_secs(DEFAULT_PER_PROBE_TIMEOUT_SECS),
            heavy_concurrency: 1,
        }
    }
}

/// Progress notification emitted while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Probe `index` acquired its slot and started.
    Started {
        index: usize,
        kind: ProbeKind,
        target: String,
    },
    /// Probe `index` produced its result.
    Finished {
        index: usize,
        status: ProbeStatus,
        duration_ms: f64,
    },
}

/// The set of probes a batch dispatches to.
///
/// Probes are shared read-only across tasks.
#[derive(Clone)]
pub struct Orchestrator {
    dns: Arc<DnsProbe>,
    latency: Arc<LatencyProbe>,
    throughput: Arc<ThroughputProbe>,
    geo: Arc<GeoProbe>,
    address: Arc<AddressProbe>,
}

impl Orchestrator {
    /// Create an orchestrator over the given probes.
    pub fn new(
        dns: DnsProbe,
        latency: LatencyProbe,
        throughput: ThroughputProbe,
        geo: GeoProbe,
        address: AddressProbe,
    ) -> Self {
        Self {
            dns: Arc::new(dns),
            latency: Arc::new(latency),
            throughput: Arc::new(throughput),
            geo: Arc::new(geo),
            address: Arc::new(address),
        }
    }

    /// Build the production probe set from settings.
    ///
    /// Must be called inside a tokio runtime (the ICMP sockets register with
    /// it).
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver or the HTTP client cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let dns = DnsProbe::with_timeout(settings.dns_timeout())?;
        let latency = LatencyProbe::with_settings(
            Arc::new(IcmpEcho::new()),
            settings.ping_count,
            settings.ping_interval(),
            settings.ping_timeout(),
        );
        let throughput = ThroughputProbe::new(HttpSpeedBackend::factory(
            client.clone(),
            settings.speed_servers.clone(),
            settings.speed_download_bytes,
            settings.speed_upload_bytes,
        ));
        let geo = GeoProbe::with_settings(
            client.clone(),
            settings.geo_base_url.as_str(),
            settings.geo_timeout(),
        );
        let address = AddressProbe::new(
            client,
            settings.public_ip_url.as_str(),
            settings.public_ip_timeout(),
        );

        Ok(Self::new(dns, latency, throughput, geo, address))
    }

    /// Run a batch and return one result per request, in request order.
    pub async fn run(&self, requests: &[ProbeRequest], policy: &RunPolicy) -> Vec<ProbeResult> {
        self.run_with_progress(requests, policy, |_: &ProgressEvent| {})
            .await
    }

    /// Run a batch, reporting progress through `progress`.
    ///
    /// The callback runs on the caller's task, never inside a probe.
    pub async fn run_with_progress(
        &self,
        requests: &[ProbeRequest],
        policy: &RunPolicy,
        progress: impl Fn(&ProgressEvent),
    ) -> Vec<ProbeResult> {
        let total = requests.len();
        tracing::info!(
            "Running {total} probes (max {} concurrent)",
            policy.max_concurrency
        );

        let global = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        let heavy_permits = policy.heavy_concurrency.max(1);
        let gates: HashMap<ProbeKind, Arc<Semaphore>> = requests
            .iter()
            .map(ProbeRequest::kind)
            .filter(ProbeKind::is_heavy)
            .map(|kind| (kind, Arc::new(Semaphore::new(heavy_permits))))
            .collect();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut tasks = FuturesUnordered::new();

        for (index, request) in requests.iter().cloned().enumerate() {
            let gate = gates.get(&request.kind()).cloned();
            let global = global.clone();
            let this = self.clone();
            let tx = tx.clone();
            let deadline = policy.per_probe_timeout;

            let handle = tokio::spawn(async move {
                // Kind gate first so a queued heavy probe does not hold a
                // global slot while it waits.
                let _gate_permit = match gate {
                    Some(gate) => gate.acquire_owned().await.ok(),
                    None => None,
                };
                let _permit = global.acquire_owned().await.ok();

                let _ = tx.send(ProgressEvent::Started {
                    index,
                    kind: request.kind(),
                    target: request.target().to_string(),
                });
                this.run_bounded(request, deadline).await
            });
            tasks.push(async move { (index, handle.await) });
        }
        drop(tx);

        let mut slots: Vec<Option<ProbeResult>> = vec![None; total];
        loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => progress(&event),
                Some((index, joined)) = tasks.next() => {
                    let result = joined.unwrap_or_else(|e| {
                        tracing::error!("Probe task {index} crashed: {e}");
                        ProbeResult::failed(
                            requests[index].clone(),
                            &ProbeError::Internal(e.to_string()),
                            Duration::ZERO,
                        )
                    });
                    progress(&ProgressEvent::Finished {
                        index,
                        status: result.status(),
                        duration_ms: result.duration_ms(),
                    });
                    slots[index] = Some(result);
                }
                else => break,
            }
        }

        let results: Vec<ProbeResult> = slots.into_iter().flatten().collect();
        let ok = results.iter().filter(|r| r.status().is_success()).count();
        tracing::info!("Batch finished: {ok}/{total} probes succeeded");
        results
    }

    /// Run one probe on its own thread and race it against `deadline`.
    ///
    /// The probe future is driven from a detached thread through the runtime
    /// handle, so a probe that blocks never occupies a runtime worker and the
    /// deadline fires on either runtime flavor. On expiry the receiver is
    /// dropped, which cancels the probe at its next await point; a probe stuck
    /// in blocking code is abandoned and its late result is discarded.
    async fn run_bounded(&self, request: ProbeRequest, deadline: Duration) -> ProbeResult {
        let start = Instant::now();
        let (mut tx, rx) = oneshot::channel::<std::result::Result<ProbeResult, String>>();
        let runtime = Handle::current();
        let this = self.clone();
        let req = request.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("netprobe-{}", request.kind()))
            .spawn(move || {
                runtime.block_on(async move {
                    let work = AssertUnwindSafe(this.dispatch(req)).catch_unwind();
                    let outcome = tokio::select! {
                        outcome = work => Some(outcome),
                        () = tx.closed() => None,
                    };
                    if let Some(outcome) = outcome {
                        let _ = tx.send(outcome.map_err(|panic| panic_message(&*panic)));
                    }
                });
            });
        if let Err(e) = spawned {
            let err = ProbeError::Internal(format!("cannot start probe thread: {e}"));
            return ProbeResult::failed(request, &err, start.elapsed());
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(result))) if start.elapsed() <= deadline => result,
            Ok(Ok(Err(msg))) => {
                tracing::error!("Probe {} {} panicked: {msg}", request.kind(), request.target());
                ProbeResult::failed(request, &ProbeError::Internal(msg), start.elapsed())
            }
            Ok(Err(_)) => {
                let err = ProbeError::Internal("probe thread exited without a result".into());
                ProbeResult::failed(request, &err, start.elapsed())
            }
            Ok(Ok(Ok(_))) | Err(_) => {
                tracing::warn!(
                    "Probe {} {} timed out after {:?}",
                    request.kind(),
                    request.target(),
                    deadline
                );
                ProbeResult::failed(request, &ProbeError::TimedOut(deadline), start.elapsed())
            }
        }
    }

    async fn dispatch(&self, request: ProbeRequest) -> ProbeResult {
        tracing::debug!("Starting {} probe for '{}'", request.kind(), request.target());
        match request.kind() {
            ProbeKind::Dns => self.dns.run(request).await,
            ProbeKind::Latency => self.latency.run(request).await,
            ProbeKind::Throughput => self.throughput.run(request).await,
            ProbeKind::Geo => self.geo.run(request).await,
            ProbeKind::PublicIp | ProbeKind::LocalIp => self.address.run(request).await,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "probe panicked".to_string())
}
