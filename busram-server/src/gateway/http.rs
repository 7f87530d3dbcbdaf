//! Accept loop and per-request host
//!
//! Each request's route runs on its own task. The host waits on the route's
//! [`Responder`], so a route may keep running after its response is
//! committed, and a panicking route becomes a 500 instead of a dropped
//! connection.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use busram_utils::BusramError;
use bytes::Bytes;
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::responder::{self, GatewayBody, Reply, Responder};
use super::Gateway;
use crate::observability::Metrics;

/// Serve connections until `shutdown` fires
///
/// Returns an error only when the platform runs out of sockets or memory;
/// `shutdown` is cancelled first so the rest of the process winds down.
pub async fn run(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
) -> Result<(), BusramError> {
    let local = listener.local_addr()?;
    info!("gateway listening on http://{}{}", local, gateway.base_path());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("gateway shutting down");
                break;
            }

            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) if is_resource_exhaustion(&e) => {
                        error!("accept failed, resources exhausted: {}", e);
                        shutdown.cancel();
                        return Err(BusramError::Io(e));
                    }
                    Err(e) => {
                        warn!("accept error: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let gateway = Arc::clone(&gateway);

                tokio::spawn(async move {
                    let service = service_fn(move |req| dispatch(Arc::clone(&gateway), req));

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        // Clients dropping streams mid-flight is routine
                        if !e.is_incomplete_message() {
                            debug!("connection error from {}: {}", remote_addr, e);
                        }
                    }
                });
            }
        }
    }

    Ok(())
}

/// Running out of descriptors or memory is fatal; anything else is per-connection
fn is_resource_exhaustion(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}

/// Run one request's route on its own task and wait for its response
pub async fn dispatch<B>(
    gateway: Arc<Gateway>,
    req: Request<B>,
) -> Result<Response<GatewayBody>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (mut responder, committed) = Responder::new();

    let route_gateway = Arc::clone(&gateway);
    tokio::spawn(async move {
        match route_gateway.route(req, &mut responder).await {
            Reply::Respond(response) => {
                if responder.is_written() {
                    warn!("route returned a response after committing one; dropped");
                } else {
                    responder.send(response);
                }
            }
            Reply::AlreadyWritten => {
                if !responder.is_written() {
                    warn!("route reported a committed response but wrote none");
                }
            }
        }
    });

    let mut response = match committed.await {
        Ok(response) => response,
        Err(_) => {
            error!("route task ended without a response");
            Metrics::global().record_error("route_failed");
            responder::error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    };
    gateway.apply_cors(&mut response);
    Ok(response)
}
