//! Metrics registry using prometheus-client.
//!
//! Three series cover the request path: a request counter and a latency
//! histogram keyed by (service, path, method, code), and an
//! active-connections gauge keyed by (service, backend_url).

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Classic Prometheus latency buckets, in seconds.
const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Labels for request count and duration.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub service: String,
    pub path: String,
    pub method: String,
    pub code: String,
}

/// Labels for the active-connections gauge.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ConnectionLabels {
    pub service: String,
    pub backend_url: String,
}

/// Process-wide metrics registry. Cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    requests_total: Family<RequestLabels, Counter>,
    request_duration_seconds: Family<RequestLabels, Histogram>,
    active_connections: Family<ConnectionLabels, Gauge>,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<RequestLabels, Histogram>::new_with_constructor(
            || Histogram::new(DURATION_BUCKETS.iter().copied()),
        );
        let active_connections = Family::<ConnectionLabels, Gauge>::default();

        registry.register(
            "http_requests",
            "Total number of HTTP requests",
            requests_total.clone(),
        );
        registry.register(
            "http_request_duration_seconds",
            "Duration of HTTP requests in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "active_connections",
            "Number of active connections to backend services",
            active_connections.clone(),
        );

        Self {
            inner: Arc::new(MetricsInner {
                requests_total,
                request_duration_seconds,
                active_connections,
                registry,
            }),
        }
    }

    /// Record one completed request: count plus duration.
    pub fn record_request(
        &self,
        service: &str,
        path: &str,
        method: &str,
        status: u16,
        duration: Duration,
    ) {
        let labels = RequestLabels {
            service: service.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            code: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();
        self.inner
            .request_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
    }

    pub fn connection_opened(&self, service: &str, backend_url: &str) {
        self.inner
            .active_connections
            .get_or_create(&ConnectionLabels {
                service: service.to_string(),
                backend_url: backend_url.to_string(),
            })
            .inc();
    }

    pub fn connection_closed(&self, service: &str, backend_url: &str) {
        self.inner
            .active_connections
            .get_or_create(&ConnectionLabels {
                service: service.to_string(),
                backend_url: backend_url.to_string(),
            })
            .dec();
    }

    /// Encode the registry in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.inner.registry)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request_encodes() {
        let metrics = Metrics::new();
        metrics.record_request("api", "/api", "GET", 200, Duration::from_millis(12));
        metrics.record_request("api", "/api", "GET", 502, Duration::from_millis(3));

        let text = metrics.encode().unwrap();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains("http_request_duration_seconds"));
        assert!(text.contains("code=\"502\""));
    }

    #[test]
    fn test_active_connections_gauge() {
        let metrics = Metrics::new();
        metrics.connection_opened("api", "http://127.0.0.1:9001");
        metrics.connection_opened("api", "http://127.0.0.1:9001");
        metrics.connection_closed("api", "http://127.0.0.1:9001");

        let text = metrics.encode().unwrap();
        assert!(text.contains("active_connections"));
        assert!(text.contains("backend_url=\"http://127.0.0.1:9001\""));
    }
}
