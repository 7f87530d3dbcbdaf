//! HTTP surface of the gateway
//!
//! `GET <base>` opens a session stream, `POST <base>?session_id=..` feeds
//! it. Everything else is liveness, metrics and CORS plumbing.

pub mod http;
pub mod probe;
pub mod responder;

#[cfg(test)]
mod tests;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use busram_protocol::{InboundMessage, JsonRpcError, JsonRpcResponse, OutboundEvent, SseEncoder};
use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Encoder;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, GatewayConfig};
use crate::mcp::{run_session, McpError, ProtocolMachine};
use crate::observability::{GaugeSnapshot, Metrics};
use crate::session::{Delivery, SessionChannels, SessionRegistry};
use crate::tools::ToolAdapter;

pub use http::run;
pub use probe::{classify, Classification};
pub use responder::{GatewayBody, Reply, Responder};

/// Largest POST body accepted
const MAX_BODY_BYTES: usize = 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared state behind every route
pub struct Gateway {
    registry: Arc<SessionRegistry>,
    tools: Arc<ToolAdapter>,
    base_path: String,
    keepalive: Duration,
    cors_origin: HeaderValue,
    policy: GatewayConfig,
}

impl Gateway {
    pub fn new(config: &AppConfig, registry: Arc<SessionRegistry>, tools: Arc<ToolAdapter>) -> Self {
        let cors_origin = HeaderValue::from_str(&config.server.cors_allow_origin).unwrap_or_else(|_| {
            warn!(
                "invalid cors_allow_origin '{}', using '*'",
                config.server.cors_allow_origin
            );
            HeaderValue::from_static("*")
        });

        Self {
            registry,
            tools,
            base_path: config.server.base_path.clone(),
            keepalive: Duration::from_secs(config.server.keepalive_secs),
            cors_origin,
            policy: config.gateway.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn is_base_path(&self, path: &str) -> bool {
        path == self.base_path || path.strip_suffix('/') == Some(self.base_path.as_str())
    }

    /// Route one request
    pub async fn route<B>(&self, req: Request<B>, responder: &mut Responder) -> Reply
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(%method, %path, "request");

        if method == Method::OPTIONS {
            return Reply::Respond(preflight());
        }

        if self.is_base_path(&path) {
            return match method {
                Method::GET => {
                    let query = req.uri().query().map(str::to_owned);
                    self.on_connect(query.as_deref(), responder).await
                }
                Method::POST => Reply::Respond(self.on_message(req).await),
                _ => Reply::Respond(method_not_allowed()),
            };
        }

        let response = match (method, path.as_str()) {
            (Method::GET, "/") => {
                responder::json(StatusCode::OK, &json!({"status": "Bus MCP Server is Running!"}))
            }
            (Method::GET, "/health") => healthy(),
            (Method::GET, "/metrics") => self.metrics(),
            _ => responder::text(StatusCode::NOT_FOUND, "Not Found"),
        };
        Reply::Respond(response)
    }

    /// Open a session and run it until the stream ends
    pub async fn on_connect(&self, query: Option<&str>, responder: &mut Responder) -> Reply {
        let requested = probe::session_token(query);

        let (session, channels) = match self.registry.create(requested) {
            Ok(created) => created,
            Err(e) => {
                warn!(kind = e.kind(), "cannot open stream: {}", e);
                Metrics::global().record_error(e.kind());
                let status = match e {
                    McpError::SessionConflict(_) => StatusCode::CONFLICT,
                    _ => StatusCode::SERVICE_UNAVAILABLE,
                };
                return Reply::Respond(responder::error(status, &e.to_string()));
            }
        };
        let SessionChannels {
            inbound_rx,
            outbound_rx,
        } = channels;

        let endpoint = format!(
            "{}?{}={}",
            self.base_path,
            probe::SESSION_PARAM,
            urlencoding::encode(session.id().as_str())
        );
        session.emit(OutboundEvent::endpoint(endpoint));

        if !responder.send(sse_response(outbound_rx)) {
            self.registry.release(&session);
            return Reply::AlreadyWritten;
        }
        info!(session = %session.id(), "stream opened");

        let machine = ProtocolMachine::new(Arc::clone(&self.tools));
        let reason = run_session(Arc::clone(&session), inbound_rx, machine, self.keepalive).await;

        self.registry.release(&session);
        info!(session = %session.id(), ?reason, "stream closed");
        Reply::AlreadyWritten
    }

    /// Submit one POSTed message and wait until its session has processed it
    pub async fn on_message<B>(&self, req: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let session_id = match classify(req.uri().query(), &self.policy) {
            Classification::Probe => {
                Metrics::global().record_probe();
                debug!("token-less POST answered as probe");
                return healthy();
            }
            Classification::RealMessage(id) => id,
        };

        let session = match self.registry.lookup(&session_id) {
            Ok(session) => session,
            Err(e) => {
                debug!(session = %session_id, "POST for unknown session");
                Metrics::global().record_error(e.kind());
                return session_not_found();
            }
        };

        if declared_length(&req).is_some_and(|len| len > MAX_BODY_BYTES as u64) {
            warn!(session = %session_id, "declared body length over limit");
            return payload_too_large();
        }

        let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(session = %session_id, "body over limit while reading");
                return payload_too_large();
            }
            Err(e) => {
                warn!(session = %session_id, "failed to read body: {}", e);
                return responder::error(StatusCode::BAD_REQUEST, "could not read body");
            }
        };

        let message = match InboundMessage::decode(session_id.clone(), &body) {
            Ok(message) => message,
            Err(e) => {
                let err = McpError::from(e);
                warn!(session = %session_id, kind = err.kind(), "rejecting body: {}", err);
                Metrics::global().record_error(err.kind());
                let rpc: JsonRpcError = err.into();
                let response = JsonRpcResponse::error(Value::Null, rpc);
                let body = serde_json::to_value(response).unwrap_or(Value::Null);
                return responder::json(StatusCode::BAD_REQUEST, &body);
            }
        };

        match session.submit(message).await {
            Delivery::Enqueued | Delivery::Silent => {
                responder::text(StatusCode::ACCEPTED, "Accepted")
            }
            Delivery::Gone => session_not_found(),
        }
    }

    fn metrics(&self) -> Response<GatewayBody> {
        let mut gauges = GaugeSnapshot {
            active_sessions: self.registry.count() as u64,
            ..Default::default()
        };
        gauges.collect_process_metrics();
        responder::prometheus(Metrics::global().to_prometheus(&gauges))
    }

    /// Stamp CORS headers on an outgoing response
    pub fn apply_cors(&self, response: &mut Response<GatewayBody>) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.cors_origin.clone());
    }
}

fn healthy() -> Response<GatewayBody> {
    responder::json(StatusCode::OK, &json!({"status": "healthy"}))
}

fn payload_too_large() -> Response<GatewayBody> {
    Metrics::global().record_error("body_too_large");
    responder::error(StatusCode::PAYLOAD_TOO_LARGE, "body too large")
}

fn declared_length<B>(req: &Request<B>) -> Option<u64> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn session_not_found() -> Response<GatewayBody> {
    responder::error(StatusCode::NOT_FOUND, "session not found")
}

fn preflight() -> Response<GatewayBody> {
    let mut response = responder::status(StatusCode::NO_CONTENT);
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
    response
}

fn method_not_allowed() -> Response<GatewayBody> {
    let mut response = responder::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, POST, OPTIONS"));
    response
}

fn sse_response(outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>) -> Response<GatewayBody> {
    let frames = UnboundedReceiverStream::new(outbound_rx).map(encode_frame);
    let mut response = Response::new(StreamBody::new(frames).boxed_unsync());

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Frame one event; an event too large to frame is replaced by an error
/// reply under the same correlation id so the caller is not left waiting
fn encode_frame(event: OutboundEvent) -> Result<Frame<Bytes>, Infallible> {
    let mut encoder = SseEncoder::new();
    let mut buf = BytesMut::new();
    let correlation_id = event.correlation_id.clone();

    if let Err(e) = encoder.encode(event, &mut buf) {
        warn!(?correlation_id, "event cannot be framed: {}", e);
        Metrics::global().record_error("frame_too_large");
        buf.clear();

        let fallback = OutboundEvent::error(
            correlation_id,
            JsonRpcError::new(
                JsonRpcError::INTERNAL_ERROR,
                format!("response could not be delivered: {}", e),
            ),
        );
        if let Err(e) = encoder.encode(fallback, &mut buf) {
            warn!("dropping error event: {}", e);
            buf.clear();
        }
    }
    Ok(Frame::data(buf.freeze()))
}
