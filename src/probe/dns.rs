//! DNS record lookup via the platform resolver.
//!
//! The resolver is configured from the system (`/etc/resolv.conf` or the
//! platform equivalent) and bounded by a deadline both inside the resolver
//! and around the whole lookup.

#![allow(clippy::missing_errors_doc)]

use crate::error::{Error, ProbeError, Result};
use crate::probe::types::{DnsRecordSet, ProbePayload, ProbeRequest, ProbeResult, RecordType};
use std::time::{Duration, Instant};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::proto::rr::{RData, RecordType as WireRecordType};
use trust_dns_resolver::TokioAsyncResolver;

/// Default resolver deadline in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

impl From<RecordType> for WireRecordType {
    fn from(rt: RecordType) -> Self {
        match rt {
            RecordType::A => Self::A,
            RecordType::Aaaa => Self::AAAA,
            RecordType::Mx => Self::MX,
            RecordType::Ns => Self::NS,
            RecordType::Txt => Self::TXT,
            RecordType::Cname => Self::CNAME,
        }
    }
}

/// DNS probe.
///
/// # Example
///
/// ```ignore
/// let probe = DnsProbe::new()?;
/// let result = probe.resolve("example.com", RecordType::Mx).await;
/// ```
pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsProbe {
    /// Create a DNS probe with the default deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver cannot be initialized.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a DNS probe with a custom deadline.
    ///
    /// Falls back to the resolver's built-in upstreams when the system
    /// configuration cannot be read.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let (config, mut opts) = match trust_dns_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                tracing::warn!("Cannot read system resolver config ({e}), using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        let resolver = TokioAsyncResolver::tokio(config, opts).map_err(Error::Resolver)?;
        Ok(Self { resolver, timeout })
    }

    /// Resolve `name` for `record_type` and wrap the outcome in a result.
    pub async fn resolve(&self, name: &str, record_type: RecordType) -> ProbeResult {
        let request = ProbeRequest::dns(name, record_type);
        self.run(request).await
    }

    /// Run a DNS request, honoring its timeout override.
    pub async fn run(&self, request: ProbeRequest) -> ProbeResult {
        let start = Instant::now();
        let record_type = request.options().record_type.unwrap_or_default();
        let deadline = request.timeout().unwrap_or(self.timeout);
        let outcome = self
            .lookup(request.target(), record_type, deadline)
            .await
            .map(ProbePayload::Dns);
        ProbeResult::from_outcome(request, outcome, start.elapsed())
    }

    /// Perform the lookup and render the records.
    pub async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        deadline: Duration,
    ) -> std::result::Result<DnsRecordSet, ProbeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProbeError::InvalidRequest("domain name is empty".into()));
        }

        tracing::debug!("Resolving {name} {record_type}");

        let lookup = tokio::time::timeout(
            deadline,
            self.resolver.lookup(name, WireRecordType::from(record_type)),
        )
        .await
        .map_err(|_| ProbeError::Timeout("DNS query".into()))?
        .map_err(|e| classify_error(&e, name, record_type))?;

        let records: Vec<String> = lookup
            .iter()
            .filter_map(|rdata| render_rdata(rdata, record_type))
            .collect();

        // Answers holding only other types (e.g. a CNAME chain) count as empty.
        if records.is_empty() {
            return Err(ProbeError::NoRecordsOfType {
                name: name.to_string(),
                record_type: record_type.to_string(),
            });
        }

        Ok(DnsRecordSet {
            name: name.trim_end_matches('.').to_string(),
            record_type,
            records,
        })
    }
}

/// Map a resolver error onto the probe taxonomy.
#[must_use]
pub fn classify_error(err: &ResolveError, name: &str, record_type: RecordType) -> ProbeError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                ProbeError::NameNotFound(name.to_string())
            } else {
                ProbeError::NoRecordsOfType {
                    name: name.to_string(),
                    record_type: record_type.to_string(),
                }
            }
        }
        ResolveErrorKind::Timeout => ProbeError::Timeout("DNS query".into()),
        _ => ProbeError::ResolutionError(err.to_string()),
    }
}

/// Render one record if it matches the queried type.
#[must_use]
pub fn render_rdata(rdata: &RData, record_type: RecordType) -> Option<String> {
    match (rdata, record_type) {
        (RData::A(ip), RecordType::A) => Some(ip.to_string()),
        (RData::AAAA(ip), RecordType::Aaaa) => Some(ip.to_string()),
        (RData::MX(mx), RecordType::Mx) => {
            Some(format_mx(&mx.exchange().to_utf8(), mx.preference()))
        }
        (RData::NS(ns), RecordType::Ns) => Some(strip_root(&ns.to_utf8())),
        (RData::CNAME(cname), RecordType::Cname) => Some(strip_root(&cname.to_utf8())),
        (RData::TXT(txt), RecordType::Txt) => Some(
            txt.iter()
                .map(|part| format!("\"{}\"", String::from_utf8_lossy(part)))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
}

/// Format an MX record as `"<exchange> (Priority: <preference>)"`.
#[must_use]
pub fn format_mx(exchange: &str, preference: u16) -> String {
    format!("{} (Priority: {})", strip_root(exchange), preference)
}

fn strip_root(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeErrorKind;
    use crate::probe::types::ProbeStatus;
    use std::str::FromStr;
    use trust_dns_resolver::proto::op::Query;
    use trust_dns_resolver::proto::rr::rdata::MX;
    use trust_dns_resolver::proto::rr::Name;

    fn no_records(response_code: ResponseCode) -> ResolveError {
        let query = Query::query(Name::from_str("example.com.").unwrap(), WireRecordType::MX);
        ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: Box::new(query),
            soa: None,
            negative_ttl: None,
            response_code,
            trusted: true,
        })
    }

    #[test]
    fn test_format_mx() {
        assert_eq!(
            format_mx("mail.example.com", 10),
            "mail.example.com (Priority: 10)"
        );
        assert_eq!(
            format_mx("mail.example.com.", 10),
            "mail.example.com (Priority: 10)"
        );
    }

    #[test]
    fn test_render_mx_rdata() {
        let exchange = Name::from_str("mail.example.com.").unwrap();
        let rdata = RData::MX(MX::new(10, exchange));
        assert_eq!(
            render_rdata(&rdata, RecordType::Mx).as_deref(),
            Some("mail.example.com (Priority: 10)")
        );
        // Wrong type for the query is skipped
        assert!(render_rdata(&rdata, RecordType::A).is_none());
    }

    #[test]
    fn test_render_a_rdata() {
        let rdata = RData::A("93.184.216.34".parse().unwrap());
        assert_eq!(
            render_rdata(&rdata, RecordType::A).as_deref(),
            Some("93.184.216.34")
        );
    }

    #[test]
    fn test_classify_error() {
        let err = ResolveError::from(ResolveErrorKind::Timeout);
        assert_eq!(
            classify_error(&err, "example.com", RecordType::A).kind(),
            ProbeErrorKind::Timeout
        );

        let err = ResolveError::from(ResolveErrorKind::Msg("connection refused".into()));
        let classified = classify_error(&err, "example.com", RecordType::A);
        assert_eq!(classified.kind(), ProbeErrorKind::ResolutionError);
        assert!(classified.to_string().contains("connection refused"));
    }

    #[test]
    fn test_classify_nxdomain() {
        let classified = classify_error(
            &no_records(ResponseCode::NXDomain),
            "nope.example.com",
            RecordType::Mx,
        );
        assert_eq!(classified.kind(), ProbeErrorKind::NameNotFound);
        assert_eq!(
            classified,
            ProbeError::NameNotFound("nope.example.com".into())
        );
        assert_eq!(classified.status(), ProbeStatus::Failed);
    }

    #[test]
    fn test_classify_empty_answer() {
        let classified = classify_error(
            &no_records(ResponseCode::NoError),
            "example.com",
            RecordType::Mx,
        );
        assert_eq!(classified.kind(), ProbeErrorKind::NoRecordsOfType);
        assert_eq!(
            classified,
            ProbeError::NoRecordsOfType {
                name: "example.com".into(),
                record_type: "MX".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_name() {
        let probe = DnsProbe::new().unwrap();
        let result = probe.resolve("  ", RecordType::A).await;
        assert_eq!(result.status(), ProbeStatus::Failed);
        assert_eq!(result.error_kind(), Some(ProbeErrorKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_nonexistent_domain() {
        // This test requires network connection which may be unreliable in CI
        if std::env::var("CI").is_ok() {
            return;
        }

        let probe = DnsProbe::new().unwrap();
        let result = probe
            .resolve("definitely-not-a-real-domain-xyz123.invalid", RecordType::A)
            .await;
        assert_eq!(result.status(), ProbeStatus::Failed);
        // Offline sandboxes surface a resolver error instead of NXDOMAIN
        if result.error_kind() != Some(ProbeErrorKind::ResolutionError) {
            assert_eq!(result.error_kind(), Some(ProbeErrorKind::NameNotFound));
        }
    }

    #[tokio::test]
    async fn test_resolve_schema_is_stable() {
        if std::env::var("CI").is_ok() {
            return;
        }

        let probe = DnsProbe::new().unwrap();
        let first = probe.resolve("example.com", RecordType::A).await;
        let second = probe.resolve("example.com", RecordType::A).await;
        assert_eq!(first.status(), second.status());
        if let (Some(ProbePayload::Dns(a)), Some(ProbePayload::Dns(b))) =
            (first.payload(), second.payload())
        {
            assert_eq!(a.name, b.name);
            assert_eq!(a.record_type, b.record_type);
        }
    }
}
