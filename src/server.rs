//! HTTP server, request dispatch and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** the server stops accepting connections, lets
//! every in-flight connection finish, then returns from [`Server::serve`].
//!
//! # Client disconnects
//!
//! Each request's chain runs on its own task. The connection only holds a
//! drop guard for the request's cancellation token: if the client goes away,
//! hyper drops the guard, the upstream step is abandoned, and every filter
//! already entered still unwinds its post-phase with
//! [`Completion::Cancelled`](crate::Completion::Cancelled).

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::exchange::Exchange;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Header carrying a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to listen on `addr` (`host:port`).
    ///
    /// ```rust,no_run
    /// use turnstile::Server;
    /// let server = Server::bind("0.0.0.0:8000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::Addr(addr.to_owned()))?;
        Ok(Self { addr })
    }

    /// Accepts connections and dispatches each request through `router`.
    ///
    /// Returns after a graceful shutdown has drained every connection.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);

        info!(addr = %self.addr, "turnstile listening");

        let mut tasks = tokio::task::JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops accepting even with a backlog.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections so the set stays bounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("turnstile stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    Ok(handle(&router, req).await)
}

/// Routes one request, runs its chain and produces one response.
///
/// Every failure becomes a status code, so hyper never sees an error.
/// Dropping the returned future before it resolves cancels the request.
async fn handle<B>(router: &Router, req: http::Request<B>) -> http::Response<Full<Bytes>>
where
    B: Body,
    B::Error: fmt::Display,
{
    let Some(route) = router.lookup(req.uri().path()) else {
        debug!(path = %req.uri().path(), "no route");
        return Response::status(StatusCode::NOT_FOUND).into_inner();
    };

    let request = match read_request(req).await {
        Ok(request) => request,
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Response::status(StatusCode::BAD_REQUEST).into_inner();
        }
    };

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let chain = tokio::spawn(async move {
        let mut exchange = Exchange::new(request);
        route.chain().execute_until(&mut exchange, &cancel).await;
        exchange.into_response()
    });

    let response = match chain.await {
        Ok(response) => response,
        Err(e) => {
            error!("filter chain aborted: {e}");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    response.into_inner()
}

/// Buffers the body and assigns the request id.
async fn read_request<B: Body>(req: http::Request<B>) -> Result<Request, B::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let id = parts.headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::now_v7().to_string(), str::to_owned);

    Ok(Request {
        id,
        method: parts.method,
        path: parts.uri.path().to_owned(),
        headers: parts.headers,
        body,
    })
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or Ctrl-C (Ctrl-C only on non-Unix platforms).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
