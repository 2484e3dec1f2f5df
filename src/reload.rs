//! Router-generation construction and hot reload.
//!
//! Each configuration load produces a complete, immutable generation:
//! the router, its services and backends, and the health-check tasks
//! serving them. Reload builds a fresh generation and swaps it in;
//! retiring the old one stops its health checkers. Requests that already
//! resolved a service keep their reference and complete normally.

use crate::balance::{build_forward_client, Backend, ForwardClient, Router, Service};
use crate::config::{Config, ServiceConfig};
use crate::health::HealthChecker;
use crate::state::AppState;
use crate::util::ShutdownSignal;
use hyper::Uri;
use std::sync::Arc;
use tracing::{error, info};

/// One complete routing generation.
pub struct Generation {
    router: Router,
    retirement: ShutdownSignal,
}

impl Generation {
    /// Build a generation from configuration and start its health-check
    /// tasks. Must run inside a tokio runtime.
    pub fn build(config: &Config) -> Generation {
        let client = build_forward_client();
        let retirement = ShutdownSignal::new();
        let mut router = Router::new();

        for service_conf in &config.services {
            let service = build_service(service_conf, &client);
            HealthChecker::start(Arc::clone(&service), retirement.subscribe());
            service.update_hash_ring();
            router.insert(service_conf.endpoint.clone(), service);
        }

        Generation { router, retirement }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Stop this generation's health-check tasks. After retirement no
    /// task of this generation mutates liveness or rings again.
    pub fn retire(&self) {
        self.retirement.shutdown();
    }
}

fn build_service(conf: &ServiceConfig, client: &ForwardClient) -> Arc<Service> {
    let mut backends = Vec::with_capacity(conf.urls.len());

    for raw in &conf.urls {
        let url: Uri = match raw.parse() {
            Ok(url) => url,
            Err(e) => {
                error!(url = %raw, error = %e, "error parsing backend URL, skipping");
                continue;
            }
        };
        match Backend::new(url, client.clone()) {
            Ok(backend) => backends.push(Arc::new(backend)),
            Err(e) => error!(url = %raw, error = %e, "invalid backend URL, skipping"),
        }
    }

    Arc::new(Service::new(
        conf.name.clone(),
        backends,
        conf.algorithm,
        conf.health_check.clone(),
    ))
}

/// Apply a freshly loaded configuration: build the next generation and
/// swap it in atomically. The retired generation's health checkers stop;
/// in-flight requests against its services complete.
pub fn apply_config(state: &AppState, config: Config) {
    let generation = Generation::build(&config);
    let services = generation.router().len();
    state.swap_generation(generation);
    info!(services, "router generation swapped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, HealthCheckConfig, ServiceConfig};

    fn test_config() -> Config {
        Config {
            services: vec![
                ServiceConfig {
                    name: "api".to_string(),
                    endpoint: "/api".to_string(),
                    urls: vec![
                        "http://127.0.0.1:9001".to_string(),
                        "http://127.0.0.1:9002".to_string(),
                    ],
                    algorithm: Algorithm::RoundRobin,
                    health_check: HealthCheckConfig::default(),
                },
                ServiceConfig {
                    name: "static".to_string(),
                    endpoint: "/static".to_string(),
                    urls: vec!["http://127.0.0.1:9003".to_string()],
                    algorithm: Algorithm::IpHash,
                    health_check: HealthCheckConfig::default(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_build_generation() {
        let generation = Generation::build(&test_config());
        assert_eq!(generation.router().len(), 2);

        let api = generation.router().get_service("/api/users").unwrap();
        assert_eq!(api.name(), "api");
        assert_eq!(api.backends().len(), 2);

        // Health checks disabled: everything alive, ring built.
        let fixed = generation.router().get_service("/static").unwrap();
        assert!(fixed.backends().iter().all(|b| b.is_alive()));
        assert_eq!(fixed.ring_snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_bad_backend_url_skipped() {
        let mut config = test_config();
        config.services[0]
            .urls
            .push("not a url at all \u{7f}".to_string());

        let generation = Generation::build(&config);
        let api = generation.router().get_service("/api").unwrap();
        assert_eq!(api.backends().len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_from_same_config_matches() {
        let config = test_config();
        let first = Generation::build(&config);
        let second = Generation::build(&config);

        assert_eq!(first.router().len(), second.router().len());
        for (a, b) in first.router().services().zip(second.router().services()) {
            assert_eq!(a.name(), b.name());
            let urls_a: Vec<_> = a.backends().iter().map(|x| x.url_str()).collect();
            let urls_b: Vec<_> = b.backends().iter().map(|x| x.url_str()).collect();
            assert_eq!(urls_a, urls_b);
            assert_eq!(a.ring_snapshot().len(), b.ring_snapshot().len());
        }
    }

    #[tokio::test]
    async fn test_swap_generation_replaces_routes() {
        let state = AppState::new(Generation::build(&test_config()), crate::metrics::Metrics::new());
        assert!(state.generation().router().get_service("/api").is_some());

        let mut next = test_config();
        next.services.remove(0);
        apply_config(&state, next);

        let generation = state.generation();
        assert!(generation.router().get_service("/api").is_none());
        assert!(generation.router().get_service("/static").is_some());
    }
}
