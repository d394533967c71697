//! IP geolocation through an ip-api.com compatible HTTP service.

#![allow(clippy::missing_errors_doc)]

use crate::error::ProbeError;
use crate::probe::types::{GeoLocation, ProbePayload, ProbeRequest, ProbeResult};
use reqwest::Url;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Default upstream base URL.
pub const DEFAULT_BASE_URL: &str = "http://ip-api.com";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Placeholder for fields the upstream leaves out.
const NOT_AVAILABLE: &str = "N/A";

/// Geolocation probe.
///
/// Issues `GET {base_url}/json/{target}` and maps the response onto
/// [`GeoLocation`].
pub struct GeoProbe {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GeoProbe {
    /// Create a geolocation probe against the public ip-api.com service.
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_settings(
            client,
            DEFAULT_BASE_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a geolocation probe against a custom upstream.
    pub fn with_settings(
        client: reqwest::Client,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Locate an IP address or domain and wrap the outcome in a result.
    pub async fn locate(&self, ip_or_domain: &str) -> ProbeResult {
        self.run(ProbeRequest::geo(ip_or_domain)).await
    }

    /// Run a geolocation request.
    pub async fn run(&self, request: ProbeRequest) -> ProbeResult {
        let start = Instant::now();
        let timeout = request.timeout().unwrap_or(self.timeout);
        let outcome = self
            .lookup(request.target(), timeout)
            .await
            .map(ProbePayload::Geo);
        ProbeResult::from_outcome(request, outcome, start.elapsed())
    }

    /// Query the upstream and parse its answer.
    pub async fn lookup(
        &self,
        ip_or_domain: &str,
        timeout: Duration,
    ) -> std::result::Result<GeoLocation, ProbeError> {
        let url = self.lookup_url(ip_or_domain)?;
        tracing::debug!("Geolocation lookup: {url}");

        let body: Value = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProbeError::UpstreamUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProbeError::UpstreamUnavailable(format!("malformed response: {e}")))?;

        parse_response(&body)
    }

    /// Build `{base_url}/json/{target}` with the target escaped as a single
    /// path segment.
    fn lookup_url(&self, ip_or_domain: &str) -> std::result::Result<Url, ProbeError> {
        let invalid =
            || ProbeError::InvalidRequest(format!("bad geolocation URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push("json")
            .push(ip_or_domain.trim());
        Ok(url)
    }
}

/// Map an upstream JSON body onto a [`GeoLocation`].
///
/// A body whose `status` is anything but `"success"` is a content-level
/// failure, reported as [`ProbeError::LookupFailed`].
pub fn parse_response(body: &Value) -> std::result::Result<GeoLocation, ProbeError> {
    if body.get("status").and_then(Value::as_str) != Some("success") {
        let reason = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unable to retrieve geolocation data, please check the input");
        return Err(ProbeError::LookupFailed(reason.to_string()));
    }

    Ok(GeoLocation {
        ip: field(body, "query"),
        country: field(body, "country"),
        region: field(body, "regionName"),
        city: field(body, "city"),
        latitude: field(body, "lat"),
        longitude: field(body, "lon"),
        isp: field(body, "isp"),
    })
}

fn field(body: &Value, key: &str) -> String {
    match body.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ProbeErrorKind;
    use crate::probe::types::ProbeStatus;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection on a random port.
    pub(crate) async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    /// HTTP client that ignores proxy settings from the environment.
    pub(crate) fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn probe(base_url: String) -> GeoProbe {
        GeoProbe::with_settings(client(), base_url, Duration::from_secs(5))
    }

    #[test]
    fn test_target_is_one_path_segment() {
        let geo = probe("http://geo.test/".into());
        assert_eq!(
            geo.lookup_url("1.1.1.1").unwrap().as_str(),
            "http://geo.test/json/1.1.1.1"
        );
        assert_eq!(
            geo.lookup_url("1.1.1.1?fields=status").unwrap().as_str(),
            "http://geo.test/json/1.1.1.1%3Ffields=status"
        );
        assert_eq!(
            geo.lookup_url("../admin/x#frag").unwrap().as_str(),
            "http://geo.test/json/..%2Fadmin%2Fx%23frag"
        );
        // Empty target asks the upstream about the caller
        assert_eq!(geo.lookup_url("").unwrap().as_str(), "http://geo.test/json/");
    }

    #[test]
    fn test_base_path_is_kept() {
        let geo = probe("http://geo.test/api".into());
        assert_eq!(
            geo.lookup_url(" example.com ").unwrap().as_str(),
            "http://geo.test/api/json/example.com"
        );
    }

    #[test]
    fn test_bad_base_url_is_invalid_request() {
        let err = probe("not a url".into()).lookup_url("1.1.1.1").unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::InvalidRequest);
    }

    #[test]
    fn test_parse_success_with_missing_fields() {
        let body = json!({
            "status": "success",
            "query": "8.8.8.8",
            "country": "United States",
            "lat": 39.03,
            "lon": -77.5,
            "isp": "Google LLC"
        });
        let geo = parse_response(&body).unwrap();
        assert_eq!(geo.ip, "8.8.8.8");
        assert_eq!(geo.country, "United States");
        assert_eq!(geo.region, "N/A");
        assert_eq!(geo.city, "N/A");
        assert_eq!(geo.latitude, "39.03");
        assert_eq!(geo.longitude, "-77.5");
    }

    #[test]
    fn test_parse_fail_status() {
        let err = parse_response(&json!({"status": "fail"})).unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::LookupFailed);

        let err = parse_response(&json!({"status": "fail", "message": "invalid query"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Lookup failed: invalid query");
    }

    #[tokio::test]
    async fn test_upstream_fail_status_is_lookup_failed() {
        let base = serve("200 OK", r#"{"status":"fail"}"#).await;
        let result = probe(base).locate("not-an-ip").await;

        assert_eq!(result.status(), ProbeStatus::Failed);
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::LookupFailed));
    }

    #[tokio::test]
    async fn test_upstream_success() {
        let base = serve(
            "200 OK",
            r#"{"status":"success","query":"1.1.1.1","country":"Australia","regionName":"Queensland","city":"South Brisbane","lat":-27.4766,"lon":153.0166,"isp":"Cloudflare, Inc"}"#,
        )
        .await;
        let result = probe(base).locate("1.1.1.1").await;

        match result.payload() {
            Some(ProbePayload::Geo(geo)) => {
                assert_eq!(geo.region, "Queensland");
                assert_eq!(geo.city, "South Brisbane");
                assert_eq!(geo.isp, "Cloudflare, Inc");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_2xx_is_upstream_unavailable() {
        let base = serve("503 Service Unavailable", "{}").await;
        let result = probe(base).locate("1.1.1.1").await;
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::UpstreamUnavailable));
    }

    #[tokio::test]
    async fn test_malformed_body_is_upstream_unavailable() {
        let base = serve("200 OK", "<html>oops</html>").await;
        let result = probe(base).locate("1.1.1.1").await;
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::UpstreamUnavailable));
    }

    #[tokio::test]
    async fn test_connection_refused_is_upstream_unavailable() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe(format!("http://{addr}")).locate("1.1.1.1").await;
        assert_eq!(result.status(), ProbeStatus::Failed);
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::UpstreamUnavailable));
    }
}
