//! A routed service: a named set of backends, the selection algorithm,
//! and the consistent-hash ring snapshot.

use crate::balance::{error_response, selector, Backend, HashRing, ProxyBody};
use crate::config::{Algorithm, HealthCheckConfig};
use crate::metrics::Metrics;
use arc_swap::ArcSwap;
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One load-balanced service.
///
/// The backend list is fixed at construction; reload replaces whole
/// services rather than mutating them. Only liveness flags, connection
/// counters, the rotation counter, and the ring snapshot change over a
/// service's lifetime.
pub struct Service {
    name: String,
    backends: Vec<Arc<Backend>>,
    algorithm: Algorithm,
    health_check: HealthCheckConfig,
    rotation: AtomicU64,
    ring: ArcSwap<HashRing>,
}

impl Service {
    pub fn new(
        name: String,
        backends: Vec<Arc<Backend>>,
        algorithm: Algorithm,
        health_check: HealthCheckConfig,
    ) -> Self {
        Self {
            name,
            backends,
            algorithm,
            health_check,
            rotation: AtomicU64::new(0),
            ring: ArcSwap::from_pointee(HashRing::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn health_check(&self) -> &HealthCheckConfig {
        &self.health_check
    }

    /// The current ring snapshot.
    pub fn ring_snapshot(&self) -> Arc<HashRing> {
        self.ring.load_full()
    }

    /// Rebuild the ring from the currently-alive backends and publish the
    /// new snapshot. Readers holding the old snapshot finish undisturbed.
    pub fn update_hash_ring(&self) {
        self.ring.store(Arc::new(HashRing::build(&self.backends)));
    }

    /// Pick a backend for this request per the configured algorithm, or
    /// `None` when no alive backend exists.
    pub fn select_backend(&self, client_addr: SocketAddr) -> Option<Arc<Backend>> {
        match self.algorithm {
            Algorithm::RoundRobin => selector::round_robin(&self.backends, &self.rotation),
            Algorithm::LeastConnections => selector::least_connections(&self.backends),
            Algorithm::IpHash => {
                let ring = self.ring.load();
                selector::ip_hash(&self.backends, &self.rotation, &ring, client_addr)
            }
        }
    }

    /// Select a backend, forward the request, and record request metrics
    /// keyed by (service, path, method, code). Without an alive backend
    /// the answer is 503.
    pub async fn handle_request(
        &self,
        req: Request<ProxyBody>,
        client_addr: SocketAddr,
        metrics: &Metrics,
    ) -> Response<ProxyBody> {
        let start = Instant::now();
        let path = req.uri().path().to_string();
        let method = req.method().to_string();

        let response = match self.select_backend(client_addr) {
            Some(backend) => backend.forward(req, &self.name, metrics).await,
            None => {
                debug!(service = %self.name, "no alive backend available");
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
        };

        let status = response.status().as_u16();
        metrics.record_request(&self.name, &path, &method, status, start.elapsed());
        response
    }
}
