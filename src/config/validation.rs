//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - Non-empty service names
/// - Endpoints that are non-empty and start with `/`
/// - Unique endpoints (router keys)
/// - Health-check paths that start with `/` when set
///
/// Backend URLs are not validated here; an unparseable URL is skipped with
/// an error log when the router is built, so one bad origin does not take
/// the whole configuration down.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();
    let mut endpoints = HashSet::new();

    for service in &config.services {
        if service.name.is_empty() {
            errors.push("service name cannot be empty".to_string());
        }

        if service.endpoint.is_empty() {
            errors.push(format!("service '{}' has an empty endpoint", service.name));
        } else if !service.endpoint.starts_with('/') {
            errors.push(format!(
                "service '{}' endpoint '{}' must start with '/'",
                service.name, service.endpoint
            ));
        }

        if !endpoints.insert(service.endpoint.as_str()) {
            errors.push(format!("duplicate endpoint: {}", service.endpoint));
        }

        let hc = &service.health_check;
        if hc.enabled && !hc.path.is_empty() && !hc.path.starts_with('/') {
            errors.push(format!(
                "service '{}' health-check path '{}' must start with '/'",
                service.name, hc.path
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, HealthCheckConfig, ServiceConfig};

    fn minimal_config() -> Config {
        Config {
            services: vec![ServiceConfig {
                name: "api".to_string(),
                endpoint: "/api".to_string(),
                urls: vec!["http://127.0.0.1:9001".to_string()],
                algorithm: Algorithm::RoundRobin,
                health_check: HealthCheckConfig::default(),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&minimal_config()).is_ok());
    }

    #[test]
    fn test_empty_services_allowed() {
        let config = Config { services: vec![] };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_endpoint_missing_slash() {
        let mut config = minimal_config();
        config.services[0].endpoint = "api".to_string();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("must start with '/'"));
    }

    #[test]
    fn test_empty_endpoint() {
        let mut config = minimal_config();
        config.services[0].endpoint = String::new();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("empty endpoint"));
    }

    #[test]
    fn test_duplicate_endpoints() {
        let mut config = minimal_config();
        let mut dup = config.services[0].clone();
        dup.name = "api-copy".to_string();
        config.services.push(dup);
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("duplicate endpoint"));
    }

    #[test]
    fn test_empty_name() {
        let mut config = minimal_config();
        config.services[0].name = String::new();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("name cannot be empty"));
    }

    #[test]
    fn test_health_check_path_missing_slash() {
        let mut config = minimal_config();
        config.services[0].health_check = HealthCheckConfig {
            enabled: true,
            interval: "10s".to_string(),
            path: "health".to_string(),
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("health-check path"));
    }

    #[test]
    fn test_zero_backends_allowed() {
        // A service with no usable backends answers 503; it is not a
        // configuration error.
        let mut config = minimal_config();
        config.services[0].urls.clear();
        assert!(validate_config(&config).is_ok());
    }
}
