//! Backend-selection algorithms.
//!
//! Pure functions over a backend list. The caller owns the rotation
//! counter and the ring snapshot; nothing here blocks on I/O.

use crate::balance::{Backend, HashRing};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Round-robin: advance the rotation counter and return the first alive
/// backend scanning from there. Ties break by insertion order. The
/// counter is never reset; wraparound at 2^64 is harmless.
pub fn round_robin(backends: &[Arc<Backend>], counter: &AtomicU64) -> Option<Arc<Backend>> {
    let count = backends.len() as u64;
    if count == 0 {
        return None;
    }

    let start = counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    for i in 0..count {
        let idx = (start.wrapping_add(i) % count) as usize;
        if backends[idx].is_alive() {
            return Some(Arc::clone(&backends[idx]));
        }
    }
    None
}

/// Least-connections: the alive backend with the fewest in-flight
/// requests at the moment of the scan. The first backend encountered
/// wins ties.
pub fn least_connections(backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
    let mut best: Option<&Arc<Backend>> = None;
    let mut min = 0;

    for backend in backends {
        if !backend.is_alive() {
            continue;
        }
        let conns = backend.active_conns();
        if best.is_none() || conns < min {
            min = conns;
            best = Some(backend);
        }
    }
    best.cloned()
}

/// Consistent hashing by client address: CRC-32 over the full
/// `host:port` form, mapped onto the ring. Two connections from the same
/// host can land on different backends because the port participates in
/// the hash. Falls back to round-robin when the ring is empty.
pub fn ip_hash(
    backends: &[Arc<Backend>],
    counter: &AtomicU64,
    ring: &HashRing,
    client_addr: SocketAddr,
) -> Option<Arc<Backend>> {
    if ring.is_empty() {
        return round_robin(backends, counter);
    }

    let hash = crc32fast::hash(client_addr.to_string().as_bytes());
    ring.lookup(hash)
}
