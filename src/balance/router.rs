//! Path-prefix routing table for one configuration generation.

use crate::balance::Service;
use std::sync::Arc;

struct Route {
    prefix: String,
    service: Arc<Service>,
}

/// Maps URL path prefixes to services.
///
/// A router is immutable once built; hot reload replaces the whole table
/// rather than editing entries in place.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a service under a path prefix. Prefixes are unique
    /// (validation rejects duplicates before construction).
    pub fn insert(&mut self, prefix: impl Into<String>, service: Arc<Service>) {
        self.routes.push(Route {
            prefix: prefix.into(),
            service,
        });
    }

    /// Longest-prefix lookup with `/`-boundary semantics: `/api` matches
    /// `/api` and `/api/users` but not `/apiary`. A bare `/` matches
    /// everything.
    pub fn get_service(&self, path: &str) -> Option<Arc<Service>> {
        self.routes
            .iter()
            .filter(|r| prefix_matches(&r.prefix, path))
            .max_by_key(|r| r.prefix.len())
            .map(|r| Arc::clone(&r.service))
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.routes.iter().map(|r| &r.service)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if path == prefix {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
