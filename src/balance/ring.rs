//! Consistent-hash ring over alive backends.

use crate::balance::Backend;
use std::collections::HashMap;
use std::sync::Arc;

/// Virtual nodes emitted per alive backend.
const VIRTUAL_NODES: u32 = 3;

/// An immutable ring snapshot: sorted 32-bit positions plus the mapping
/// from position to backend. Rebuilt and republished wholesale whenever
/// the alive set changes; readers keep working on the snapshot they hold.
#[derive(Default)]
pub struct HashRing {
    positions: Vec<u32>,
    nodes: HashMap<u32, Arc<Backend>>,
}

impl HashRing {
    /// Build a ring from the alive subset of `backends`. Each alive
    /// backend contributes positions `crc32("<url>-<i>")` for i in 0..3.
    pub fn build(backends: &[Arc<Backend>]) -> Self {
        let mut positions = Vec::new();
        let mut nodes = HashMap::new();

        for backend in backends {
            if !backend.is_alive() {
                continue;
            }
            for i in 0..VIRTUAL_NODES {
                let key = format!("{}-{}", backend.url_str(), i);
                let position = crc32fast::hash(key.as_bytes());
                positions.push(position);
                // On a position collision the later insertion wins.
                nodes.insert(position, Arc::clone(backend));
            }
        }

        positions.sort_unstable();
        Self { positions, nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of ring positions (3 per alive backend; collisions shrink
    /// the map, not this count).
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Map a 32-bit hash to its backend: the first position clockwise of
    /// (at or after) the hash, wrapping past the maximum to the start.
    pub fn lookup(&self, hash: u32) -> Option<Arc<Backend>> {
        if self.positions.is_empty() {
            return None;
        }

        let idx = self.positions.partition_point(|&p| p < hash);
        let idx = if idx == self.positions.len() { 0 } else { idx };
        self.nodes.get(&self.positions[idx]).cloned()
    }

    /// Whether any ring position maps to the given backend URL.
    pub fn contains(&self, url: &str) -> bool {
        self.nodes.values().any(|b| b.url_str() == url)
    }
}
