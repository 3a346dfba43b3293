use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use ipnetwork::IpNetwork;
use opentelemetry::{global, metrics::Counter, KeyValue};
use std::net::{IpAddr, SocketAddr};
use tower_governor::key_extractor::KeyExtractor;
use tower_governor::GovernorError;
use tracing::warn;

/// Per-IP abuse guard in front of the public webhook ingress (§6 "must
/// return within 100 ms p95" — this is what keeps a flood of forged
/// callbacks from starving that budget). Ported close to verbatim from the
/// teacher's own public-API rate limiter; this system has no
/// per-authenticated-caller surface of its own to protect, only the
/// anonymous `/webhooks/{provider}` ingress.
#[derive(Clone, Debug)]
pub struct Metrics {
    pub(crate) decisions_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("outbound-core");
        Self {
            decisions_total: meter
                .u64_counter("webhook_ingress_rate_limit_decisions_total")
                .with_description("Rate limit decisions (allowed/throttled) on the webhook ingress")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct IpKeyExtractor {
    pub(crate) trusted_proxies: Vec<IpNetwork>,
}

impl IpKeyExtractor {
    #[must_use]
    pub const fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { trusted_proxies }
    }

    #[must_use]
    pub fn identify_client_ip(&self, headers: &axum::http::HeaderMap, peer_addr: IpAddr) -> IpAddr {
        if !self.is_trusted(&peer_addr) {
            return peer_addr;
        }

        let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());

        if let Some(xff_val) = xff
            && let Some(real_ip) =
                xff_val.rsplit(',').filter_map(|s| s.trim().parse::<IpAddr>().ok()).find(|ip| !self.is_trusted(ip))
        {
            return real_ip;
        }

        peer_addr
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(*ip))
    }
}

impl KeyExtractor for IpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.identify_client_ip(req.headers(), peer_ip))
    }
}

#[derive(Clone, Debug)]
pub struct IpRateLimitService {
    pub extractor: IpKeyExtractor,
    pub metrics: Metrics,
}

impl IpRateLimitService {
    #[must_use]
    pub fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { extractor: IpKeyExtractor::new(trusted_proxies), metrics: Metrics::new() }
    }

    pub fn log_decision(&self, status: StatusCode, retry_after: Option<String>) {
        let label = if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(after) = retry_after {
                warn!("Webhook ingress rate limit exceeded (retry allowed after {}s)", after);
            }
            "throttled"
        } else {
            "allowed"
        };

        self.metrics.decisions_total.add(1, &[KeyValue::new("status", label)]);
    }
}

/// Parses the comma-separated CIDR list from [`crate::config::ServerConfig::trusted_proxies`].
///
/// # Panics
/// Panics if any entry is not a valid CIDR — this is operator-supplied boot
/// configuration, not request input, so failing fast is correct.
#[must_use]
pub fn parse_trusted_proxies(raw: &str) -> Vec<IpNetwork> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().unwrap_or_else(|e| panic!("invalid trusted proxy CIDR '{s}': {e}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn untrusted_peer_is_its_own_key() {
        let extractor = IpRateLimitService::new(parse_trusted_proxies("10.0.0.0/8")).extractor;
        let headers = axum::http::HeaderMap::new();
        let peer = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5));
        assert_eq!(extractor.identify_client_ip(&headers, peer), peer);
    }

    #[test]
    fn trusted_peer_defers_to_forwarded_for() {
        let extractor = IpRateLimitService::new(parse_trusted_proxies("10.0.0.0/8")).extractor;
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(extractor.identify_client_ip(&headers, peer), IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)));
    }
}
