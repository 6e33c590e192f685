//! HTTP server for the bridge.
//!
//! `BridgeServer` accepts HTTP/1.1 connections and runs every request
//! through the handler pipeline (`Retry` → `InvocationBridge` by
//! default), writing into a fresh [`BufferedWriter`] per request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{Instrument, error, field, info, info_span, warn};

use crate::bridge::InvocationBridge;
use crate::config::BridgeConfig;
use crate::convert::read_body;
use crate::handler::Handler;
use crate::invoke::FunctionInvoker;
use crate::record::ResponseCodeRecorder;
use crate::retry::Retry;
use crate::writer::{BufferedWriter, ResponseWriter};

/// Build the default pipeline: whole-request retry around the bridge.
pub fn pipeline(config: &BridgeConfig, invoker: Arc<dyn FunctionInvoker>) -> Arc<dyn Handler> {
    let bridge = InvocationBridge::new(invoker)
        .with_max_context_bytes(config.limits.max_context_bytes)
        .with_max_body_bytes(config.limits.max_body_bytes);
    Arc::new(Retry::new(config.retry.attempts, Arc::new(bridge)))
}

/// HTTP front end of the bridge.
pub struct BridgeServer {
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    max_body_bytes: usize,
}

impl BridgeServer {
    /// Bind the listening socket. Port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn Handler>,
        max_body_bytes: usize,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind bridge listener on {addr}"))?;
        Ok(Self {
            listener,
            handler,
            max_body_bytes,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown signal changes. Each
    /// connection runs in its own task.
    pub async fn serve(self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "bridge listening");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    let handler = self.handler.clone();
                    let max_body_bytes = self.max_body_bytes;

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req: Request<Incoming>| {
                            let handler = handler.clone();
                            async move {
                                Ok::<_, Infallible>(respond(handler.as_ref(), req, max_body_bytes).await)
                            }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer_addr, error = %e, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("bridge shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Run one request through `handler` and produce the response.
pub async fn respond<B>(
    handler: &dyn Handler,
    request: Request<B>,
    max_body_bytes: usize,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let span = info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        http.status_code = field::Empty
    );

    async {
        let (parts, body) = request.into_parts();
        let mut out = BufferedWriter::new();

        let result = match read_body(body, max_body_bytes).await {
            Ok(bytes) => {
                let buffered = Request::from_parts(parts, Full::new(bytes));
                handler.serve(buffered, &mut out, &span).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            let status = e.status();
            warn!(error = %e, %status, "request failed");
            span.record_response_code(status);
            out = BufferedWriter::new();
            out.write_status(status);
            out.write_body(e.to_string().as_bytes());
        }

        let response = out.into_response();
        info!(status = %response.status(), "request completed");
        response
    }
    .instrument(span.clone())
    .await
}
