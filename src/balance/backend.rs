//! Backend origins and request forwarding.

use crate::metrics::Metrics;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Body, Frame, SizeHint};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tracing::error;

/// Body type flowing through the proxy, both upstream and downstream.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Pooled upstream HTTP client, shared by all backends of a generation.
pub type ForwardClient = Client<HttpConnector, ProxyBody>;

/// Build the upstream client used by every backend of a router generation.
pub fn build_forward_client() -> ForwardClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Error building a backend from a configured origin URL.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend URL has no scheme: {0}")]
    MissingScheme(Uri),

    #[error("backend URL has no host: {0}")]
    MissingHost(Uri),
}

/// One origin server within a service.
///
/// Liveness is owned by the health checker; the active-connection counter
/// tracks in-flight forwarded requests, including response bodies still
/// streaming to the client.
pub struct Backend {
    url: Uri,
    url_str: String,
    client: ForwardClient,
    alive: AtomicBool,
    active_conns: AtomicI64,
}

impl Backend {
    /// Create a backend bound to `url`. The URL must carry a scheme and a
    /// host; callers skip (and log) origins that do not.
    pub fn new(url: Uri, client: ForwardClient) -> Result<Self, BackendError> {
        let scheme = url
            .scheme_str()
            .ok_or_else(|| BackendError::MissingScheme(url.clone()))?;
        let authority = url
            .authority()
            .ok_or_else(|| BackendError::MissingHost(url.clone()))?;
        let url_str = format!("{}://{}", scheme, authority);

        Ok(Self {
            url,
            url_str,
            client,
            alive: AtomicBool::new(true),
            active_conns: AtomicI64::new(0),
        })
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// The canonical `scheme://host[:port]` form, used for metric labels
    /// and ring keys.
    pub fn url_str(&self) -> &str {
        &self.url_str
    }

    /// Probe target for the health checker: origin plus probe path.
    pub fn probe_target(&self, path: &str) -> String {
        format!("{}{}", self.url_str, path)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub fn inc_conn(&self) {
        self.active_conns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_conn(&self) {
        self.active_conns.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_conns(&self) -> i64 {
        self.active_conns.load(Ordering::Relaxed)
    }

    /// Forward a request to this backend.
    ///
    /// The connection counter and gauge are incremented here and
    /// decremented on every exit path; for successful responses that
    /// happens when the response body finishes streaming. A transport
    /// failure answers 502 and does not touch liveness; the active prober
    /// alone decides that.
    pub async fn forward(
        self: Arc<Self>,
        mut req: Request<ProxyBody>,
        service: &str,
        metrics: &Metrics,
    ) -> Response<ProxyBody> {
        let guard = ConnectionGuard::new(Arc::clone(&self), service, metrics.clone());

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let target: Uri = match format!("{}{}", self.url_str, path_and_query).parse() {
            Ok(uri) => uri,
            Err(e) => {
                error!(backend = %self.url_str, error = %e, "invalid upstream URI");
                return error_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
            }
        };
        *req.uri_mut() = target;

        match self.client.request(req).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                let body = GuardedBody {
                    inner: body.boxed(),
                    _guard: guard,
                };
                Response::from_parts(parts, body.boxed())
            }
            Err(e) => {
                error!(backend = %self.url_str, error = %e, "proxy error");
                error_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }
}

/// Pairs the connection-counter increment with exactly one decrement,
/// whichever way the request ends.
struct ConnectionGuard {
    backend: Arc<Backend>,
    service: String,
    metrics: Metrics,
}

impl ConnectionGuard {
    fn new(backend: Arc<Backend>, service: &str, metrics: Metrics) -> Self {
        backend.inc_conn();
        metrics.connection_opened(service, backend.url_str());
        Self {
            backend,
            service: service.to_string(),
            metrics,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_conn();
        self.metrics
            .connection_closed(&self.service, self.backend.url_str());
    }
}

/// Response body that holds the connection guard until the last frame is
/// consumed.
struct GuardedBody {
    inner: ProxyBody,
    _guard: ConnectionGuard,
}

impl Body for GuardedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Build a plain-text response for locally generated statuses.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let body = Full::new(Bytes::from(format!("{}\n", message)))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(body)
        .unwrap()
}
