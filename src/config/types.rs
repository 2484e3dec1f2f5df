//! Configuration data types.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Fallback probe interval when the configured one does not parse.
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Routed services, one per URL path prefix.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// One load-balanced service bound to a URL path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Symbolic name, used in logs and metric labels.
    pub name: String,

    /// URL path prefix this service answers on. Must start with `/`.
    pub endpoint: String,

    /// Backend origin URLs.
    #[serde(default)]
    pub urls: Vec<String>,

    /// Backend-selection algorithm.
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Active health-check settings.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

/// Backend-selection algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    IpHash,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round-robin",
            Algorithm::LeastConnections => "least-connections",
            Algorithm::IpHash => "ip-hash",
        }
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // An empty string means "not configured" and falls back to
        // round-robin; anything else must name a known algorithm.
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "" | "round-robin" => Ok(Algorithm::RoundRobin),
            "least-connections" => Ok(Algorithm::LeastConnections),
            "ip-hash" => Ok(Algorithm::IpHash),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["round-robin", "least-connections", "ip-hash"],
            )),
        }
    }
}

/// Active health-check settings for a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Whether to run periodic probes. When disabled, every backend is
    /// considered alive.
    #[serde(default)]
    pub enabled: bool,

    /// Probe interval as a duration string, e.g. "10s".
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Probe path on each backend, e.g. "/health".
    #[serde(default)]
    pub path: String,
}

impl HealthCheckConfig {
    /// The parsed probe interval, falling back to 10 seconds when the
    /// configured string does not parse.
    pub fn probe_interval(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(DEFAULT_PROBE_INTERVAL)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_interval(),
            path: String::new(),
        }
    }
}

fn default_interval() -> String {
    "10s".to_string()
}
