//! Service routing plane: backends, selection algorithms, hash ring,
//! services, and the path-prefix router.

mod backend;
mod ring;
mod router;
pub mod selector;
mod service;

pub(crate) use backend::error_response;
pub use backend::{build_forward_client, Backend, BackendError, ForwardClient, ProxyBody};
pub use ring::HashRing;
pub use router::Router;
pub use service::Service;
