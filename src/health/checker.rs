//! Active health checker.
//!
//! One checker task per service. Each sweep probes every backend, flips
//! liveness where the probe disagrees, and rebuilds the service's hash
//! ring when anything changed. Passive signals (forwarding errors) never
//! touch liveness; the prober is the only writer.

use crate::balance::{Backend, Service};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Total budget for one probe attempt.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Active health checker for one service.
pub struct HealthChecker {
    service: Arc<Service>,
    client: Client,
}

impl HealthChecker {
    fn new(service: Arc<Service>) -> Self {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { service, client }
    }

    /// Start health checking for a service.
    ///
    /// When checks are disabled, every backend is marked alive and the
    /// ring is built once; no task runs. Otherwise a background task
    /// sweeps immediately and then on every interval tick until the
    /// retirement signal fires.
    pub fn start(service: Arc<Service>, shutdown: broadcast::Receiver<()>) {
        if !service.health_check().enabled {
            for backend in service.backends() {
                backend.set_alive(true);
            }
            service.update_hash_ring();
            return;
        }

        let checker = HealthChecker::new(service);
        tokio::spawn(checker.run(shutdown));
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.service.health_check().probe_interval();
        debug!(
            service = %self.service.name(),
            interval = ?period,
            "health checker starting"
        );

        // Initial sweep so a cold start converges before the first tick.
        self.sweep().await;

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.recv() => {
                    debug!(service = %self.service.name(), "health checker stopping");
                    break;
                }
            }
        }
    }

    /// One probe pass over all backends. Flips liveness where the probe
    /// disagrees and rebuilds the ring when any backend changed state.
    async fn sweep(&self) {
        let mut changed = false;

        for backend in self.service.backends() {
            let alive = self.probe(backend).await;
            if backend.is_alive() != alive {
                backend.set_alive(alive);
                changed = true;
                info!(
                    service = %self.service.name(),
                    backend = %backend.url_str(),
                    status = if alive { "up" } else { "down" },
                    "backend status changed"
                );
            }
        }

        if changed {
            self.service.update_hash_ring();
        }
    }

    /// HEAD first; on transport failure retry once with GET. Any status
    /// below 500 counts as alive: the origin answered, even if it did not
    /// like the probe request.
    async fn probe(&self, backend: &Arc<Backend>) -> bool {
        let target = backend.probe_target(&self.service.health_check().path);

        let response = match self.client.head(&target).send().await {
            Ok(response) => response,
            Err(_) => match self.client.get(&target).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(backend = %backend.url_str(), error = %e, "health probe failed");
                    return false;
                }
            },
        };

        (200..500).contains(&response.status().as_u16())
    }
}
