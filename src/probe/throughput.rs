//! Download/upload bandwidth measurement.
//!
//! The measurement itself belongs to a [`SpeedBackend`]; this module only
//! sequences the transaction and normalizes units. Backends carry no
//! deadline of their own, so callers must bound the run (the orchestrator
//! does).

#![allow(clippy::missing_errors_doc)]

use crate::error::{Error, ProbeError, Result};
use crate::probe::types::{
    round2, ProbePayload, ProbeRequest, ProbeResult, ServerInfo, ThroughputReport,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default transfer size for the download leg in bytes.
pub const DEFAULT_DOWNLOAD_BYTES: u64 = 25_000_000;

/// Default transfer size for the upload leg in bytes.
pub const DEFAULT_UPLOAD_BYTES: u64 = 10_000_000;

/// A bandwidth measurement service.
///
/// Methods are called in order: `select_best_server`, `download`, `upload`,
/// then `last_ping` and `server_info`.
pub trait SpeedBackend: Send {
    /// Pick the server the transfers will run against.
    fn select_best_server(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Run the download transaction, returning bits per second.
    fn download(&mut self) -> BoxFuture<'_, Result<f64>>;

    /// Run the upload transaction, returning bits per second.
    fn upload(&mut self) -> BoxFuture<'_, Result<f64>>;

    /// Round-trip time to the selected server in milliseconds.
    fn last_ping(&self) -> Result<f64>;

    /// Metadata of the selected server.
    fn server_info(&self) -> Result<ServerInfo>;
}

/// Creates a fresh backend for each measurement.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn SpeedBackend> + Send + Sync>;

/// Throughput probe.
pub struct ThroughputProbe {
    factory: BackendFactory,
}

impl ThroughputProbe {
    /// Create a throughput probe over the given backend factory.
    pub fn new(factory: BackendFactory) -> Self {
        Self { factory }
    }

    /// Run a throughput request.
    pub async fn run(&self, request: ProbeRequest) -> ProbeResult {
        let start = Instant::now();
        let mut backend = (self.factory)();
        let outcome = measure(backend.as_mut())
            .await
            .map(ProbePayload::Throughput)
            .map_err(|e| ProbeError::ThroughputTestFailed(e.to_string()));
        ProbeResult::from_outcome(request, outcome, start.elapsed())
    }

    /// Measure throughput and wrap the outcome in a result.
    pub async fn measure_throughput(&self) -> ProbeResult {
        self.run(ProbeRequest::throughput()).await
    }
}

/// Run the full transaction against one backend.
///
/// Any failing step aborts the remaining ones.
pub async fn measure(backend: &mut dyn SpeedBackend) -> Result<ThroughputReport> {
    tracing::debug!("Selecting best speed test server");
    backend.select_best_server().await?;

    tracing::debug!("Running download test");
    let download_bps = backend.download().await?;

    tracing::debug!("Running upload test");
    let upload_bps = backend.upload().await?;

    Ok(ThroughputReport {
        download_mbps: to_mbps(download_bps),
        upload_mbps: to_mbps(upload_bps),
        ping_ms: round2(backend.last_ping()?),
        server: backend.server_info()?,
    })
}

/// Convert bits per second to megabits per second, rounded to 2 decimals.
#[must_use]
pub fn to_mbps(bits_per_sec: f64) -> f64 {
    round2(bits_per_sec / 1e6)
}

/// A candidate server for [`HttpSpeedBackend`].
///
/// The server must answer `GET {url}/__down?bytes=N` with `N` bytes and
/// accept `POST {url}/__up`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeedServer {
    pub host: String,
    pub url: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "N/A".to_string()
}

impl Default for SpeedServer {
    fn default() -> Self {
        Self {
            host: "speed.cloudflare.com".to_string(),
            url: "https://speed.cloudflare.com".to_string(),
            country: "Anycast".to_string(),
        }
    }
}

/// HTTP speed backend.
///
/// Picks the candidate with the lowest round trip for an empty download,
/// then times one download and one upload of the configured sizes.
pub struct HttpSpeedBackend {
    client: reqwest::Client,
    servers: Vec<SpeedServer>,
    download_bytes: u64,
    upload_bytes: u64,
    selected: Option<(SpeedServer, f64)>,
}

impl HttpSpeedBackend {
    /// Create a backend over the given candidate servers.
    pub fn new(
        client: reqwest::Client,
        servers: Vec<SpeedServer>,
        download_bytes: u64,
        upload_bytes: u64,
    ) -> Self {
        Self {
            client,
            servers,
            download_bytes,
            upload_bytes,
            selected: None,
        }
    }

    /// Build a factory producing backends that share one HTTP client.
    #[must_use]
    pub fn factory(
        client: reqwest::Client,
        servers: Vec<SpeedServer>,
        download_bytes: u64,
        upload_bytes: u64,
    ) -> BackendFactory {
        Arc::new(move || {
            Box::new(Self::new(
                client.clone(),
                servers.clone(),
                download_bytes,
                upload_bytes,
            )) as Box<dyn SpeedBackend>
        })
    }

    fn selected(&self) -> Result<&(SpeedServer, f64)> {
        self.selected
            .as_ref()
            .ok_or_else(|| Error::network("no speed test server selected"))
    }

    async fn ping_server(&self, server: &SpeedServer) -> Result<f64> {
        let url = format!("{}/__down?bytes=0", server.url.trim_end_matches('/'));
        let start = Instant::now();
        self.client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

impl SpeedBackend for HttpSpeedBackend {
    fn select_best_server(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut best: Option<(SpeedServer, f64)> = None;
            for server in &self.servers {
                match self.ping_server(server).await {
                    Ok(ping) => {
                        tracing::debug!("Speed server {} answered in {ping:.1} ms", server.host);
                        if best.as_ref().map_or(true, |(_, b)| ping < *b) {
                            best = Some((server.clone(), ping));
                        }
                    }
                    Err(e) => tracing::debug!("Speed server {} unreachable: {e}", server.host),
                }
            }

            self.selected = Some(
                best.ok_or_else(|| Error::network("no reachable speed test server"))?,
            );
            Ok(())
        })
    }

    fn download(&mut self) -> BoxFuture<'_, Result<f64>> {
        Box::pin(async move {
            let (server, _) = self.selected()?;
            let url = format!(
                "{}/__down?bytes={}",
                server.url.trim_end_matches('/'),
                self.download_bytes
            );

            let start = Instant::now();
            let mut response = self.client.get(&url).send().await?.error_for_status()?;
            let mut received: u64 = 0;
            while let Some(chunk) = response.chunk().await? {
                received += chunk.len() as u64;
            }
            Ok(bits_per_sec(received, start.elapsed()))
        })
    }

    fn upload(&mut self) -> BoxFuture<'_, Result<f64>> {
        Box::pin(async move {
            let (server, _) = self.selected()?;
            let url = format!("{}/__up", server.url.trim_end_matches('/'));
            let body = vec![0u8; self.upload_bytes as usize];

            let start = Instant::now();
            self.client
                .post(&url)
                .body(body)
                .send()
                .await?
                .error_for_status()?;
            Ok(bits_per_sec(self.upload_bytes, start.elapsed()))
        })
    }

    fn last_ping(&self) -> Result<f64> {
        self.selected().map(|(_, ping)| *ping)
    }

    fn server_info(&self) -> Result<ServerInfo> {
        self.selected().map(|(server, _)| ServerInfo {
            host: server.host.clone(),
            country: server.country.clone(),
        })
    }
}

fn bits_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(1e-6);
    bytes as f64 * 8.0 / secs
}
