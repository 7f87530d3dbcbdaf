//! One-shot response slot handed to route handlers
//!
//! A handler either returns its response for the host to write, or commits
//! one itself through the [`Responder`] and returns
//! [`Reply::AlreadyWritten`]. The stream route does the latter: it sends the
//! SSE response head, then keeps running the session.

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use tokio::sync::oneshot;

/// Body type for every gateway response
pub type GatewayBody = UnsyncBoxBody<Bytes, Infallible>;

/// What a route handler hands back to the host
pub enum Reply {
    /// Host writes this response
    Respond(Response<GatewayBody>),
    /// Handler already committed a response through its responder
    AlreadyWritten,
}

/// Sending half of a route's response slot
pub struct Responder {
    tx: Option<oneshot::Sender<Response<GatewayBody>>>,
}

impl Responder {
    pub fn new() -> (Self, oneshot::Receiver<Response<GatewayBody>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Commit `response`; false if one was already committed or the host
    /// stopped waiting
    pub fn send(&mut self, response: Response<GatewayBody>) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn is_written(&self) -> bool {
        self.tx.is_none()
    }
}

pub fn full(body: impl Into<Bytes>) -> GatewayBody {
    Full::new(body.into()).boxed_unsync()
}

pub fn empty() -> GatewayBody {
    Empty::<Bytes>::new().boxed_unsync()
}

fn with_body(status: StatusCode, content_type: &'static str, body: GatewayBody) -> Response<GatewayBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json(status: StatusCode, value: &serde_json::Value) -> Response<GatewayBody> {
    with_body(status, "application/json", full(value.to_string()))
}

pub fn text(status: StatusCode, body: &'static str) -> Response<GatewayBody> {
    with_body(status, "text/plain; charset=utf-8", full(body))
}

pub fn status(status: StatusCode) -> Response<GatewayBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = status;
    response
}

pub fn prometheus(body: String) -> Response<GatewayBody> {
    with_body(
        StatusCode::OK,
        "text/plain; version=0.0.4; charset=utf-8",
        full(body),
    )
}

/// Error body shared by the session-level HTTP failures
pub fn error(status_code: StatusCode, message: &str) -> Response<GatewayBody> {
    json(status_code, &serde_json::json!({ "error": message }))
}
