//! Shared utilities: logging, shutdown signalling, request IDs.

mod logging;
mod request_id;
mod shutdown;

pub use logging::{init_logging, LogFormat};
pub use request_id::RequestId;
pub use shutdown::ShutdownSignal;
