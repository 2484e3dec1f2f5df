//! HTTP listener and request dispatch.
//!
//! A single listener serves both the proxy surface and `GET /metrics`.
//! Dispatch resolves the path against the current router generation,
//! wraps the request in a `proxy_request` span, and hands it to the
//! service. Unmatched paths answer 404.

use crate::balance::{error_response, ProxyBody};
use crate::state::AppState;
use crate::util::RequestId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};

/// Deadline for draining in-flight connections at shutdown.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// The front-end listener.
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    /// Bind the listener. A bind failure is fatal at startup.
    pub async fn bind(addr: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, "listener bound");
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, then drain in-flight ones.
    pub async fn run(self) {
        let mut shutdown = self.state.shutdown().subscribe();
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                accept = self.listener.accept() => {
                    match accept {
                        Ok((stream, client_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!(error = %e, "failed to set TCP_NODELAY");
                            }

                            let state = self.state.clone();
                            let active = Arc::clone(&active);
                            active.fetch_add(1, Ordering::SeqCst);

                            tokio::spawn(async move {
                                let connection_id = RequestId::short();
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let state = state.clone();
                                    async move { dispatch(req, client_addr, state).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .keep_alive(true)
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(
                                        client = %client_addr,
                                        connection_id = %connection_id,
                                        error = %e,
                                        "connection error"
                                    );
                                }

                                active.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }

                _ = shutdown.recv() => {
                    info!("listener shutting down");
                    break;
                }
            }
        }

        drain(&active).await;
    }
}

/// Wait for in-flight connections to finish, up to the drain deadline.
async fn drain(active: &AtomicUsize) {
    let deadline = Instant::now() + DRAIN_DEADLINE;
    loop {
        let remaining = active.load(Ordering::SeqCst);
        if remaining == 0 {
            info!("all connections drained");
            return;
        }
        if Instant::now() >= deadline {
            warn!(remaining, "drain deadline reached, closing");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Route one request: the metrics endpoint, a configured service, or 404.
async fn dispatch(
    req: Request<Incoming>,
    client_addr: SocketAddr,
    state: AppState,
) -> Result<Response<ProxyBody>, Infallible> {
    let path = req.uri().path().to_string();

    if path == "/metrics" {
        return Ok(metrics_response(req.method(), &state));
    }

    // The generation guard is dropped before awaiting; the request keeps
    // only its service reference, so a concurrent reload can retire the
    // generation underneath us.
    let service = {
        let generation = state.generation();
        generation.router().get_service(&path)
    };
    let Some(service) = service else {
        return Ok(error_response(StatusCode::NOT_FOUND, "Not Found"));
    };

    let span = tracing::info_span!(
        "proxy_request",
        http.path = %path,
        service.name = %service.name(),
    );

    // Propagate correlation context to the upstream.
    let (mut parts, body) = req.into_parts();
    let request_id = RequestId::new();
    if let Ok(value) = request_id.as_str().parse() {
        parts.headers.insert("x-request-id", value);
    }
    if let Ok(value) = client_addr.ip().to_string().parse::<hyper::header::HeaderValue>() {
        parts.headers.insert("x-forwarded-for", value.clone());
        parts.headers.insert("x-real-ip", value);
    }
    let req = Request::from_parts(parts, body.boxed());

    debug!(
        path = %path,
        service = %service.name(),
        request_id = %request_id,
        "forwarding request"
    );

    let metrics = state.metrics().clone();
    let response = service
        .handle_request(req, client_addr, &metrics)
        .instrument(span)
        .await;
    Ok(response)
}

fn metrics_response(method: &Method, state: &AppState) -> Response<ProxyBody> {
    if method != Method::GET {
        return error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }

    match state.metrics().encode() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
            .body(
                Full::new(Bytes::from(body))
                    .map_err(|never| match never {})
                    .boxed(),
            )
            .unwrap(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::reload::Generation;
    use crate::Config;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let state = AppState::new(Generation::build(&Config::default()), Metrics::new());
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), state)
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
