//! Route-level tests driven through `dispatch` with in-memory bodies

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use busram_protocol::{EventKind, JsonRpcError, SseDecoder, SseFrame};
use http_body_util::Full;
use tokio::time::timeout;
use tokio_util::codec::Decoder;

use super::http::dispatch;
use super::*;
use crate::config::TokenlessPost;
use crate::tools::testing::{fake_registry, FakeTransit};

const WAIT: Duration = Duration::from_secs(2);

fn gateway_with(fake: FakeTransit, policy: TokenlessPost) -> Arc<Gateway> {
    let mut config = AppConfig::default();
    config.gateway.tokenless_post = policy;
    config.server.keepalive_secs = 60;

    let tools = Arc::new(ToolAdapter::new(fake_registry(fake)));
    Arc::new(Gateway::new(&config, Arc::new(SessionRegistry::new()), tools))
}

fn gateway() -> Arc<Gateway> {
    gateway_with(FakeTransit::default(), TokenlessPost::Probe)
}

async fn send(gateway: &Arc<Gateway>, method: Method, uri: &str, body: &str) -> Response<GatewayBody> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();
    dispatch(Arc::clone(gateway), req).await.unwrap()
}

async fn read_json(response: Response<GatewayBody>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn read_text(response: Response<GatewayBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Client side of an open event stream
struct EventStream {
    body: GatewayBody,
    decoder: SseDecoder,
    buf: BytesMut,
}

impl EventStream {
    async fn open(gateway: &Arc<Gateway>, uri: &str) -> (Self, String) {
        let response = send(gateway, Method::GET, uri, "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        let mut stream = Self {
            body: response.into_body(),
            decoder: SseDecoder::new(),
            buf: BytesMut::new(),
        };
        let endpoint = stream.next_frame().await;
        assert_eq!(endpoint.event.as_deref(), Some("endpoint"));
        (stream, endpoint.data)
    }

    async fn next_frame(&mut self) -> SseFrame {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf).unwrap() {
                return frame;
            }
            let frame = timeout(WAIT, self.body.frame())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .unwrap();
            if let Ok(data) = frame.into_data() {
                self.buf.extend_from_slice(&data);
            }
        }
    }

    async fn next_message(&mut self) -> Value {
        let frame = self.next_frame().await;
        assert_eq!(frame.event.as_deref(), Some("message"));
        serde_json::from_str(&frame.data).unwrap()
    }
}

fn rpc(id: i64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

fn initialize() -> String {
    rpc(
        0,
        "initialize",
        json!({"protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "test", "version": "1"}}),
    )
}

async fn wait_until_empty(gateway: &Arc<Gateway>) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while gateway.registry().count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "session was never released");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_tokenless_post_is_probe_for_any_body() {
    let fake = FakeTransit::default();
    let gateway = gateway_with(fake.clone(), TokenlessPost::Probe);

    let call = rpc(1, "tools/call", json!({"name": "search_station", "arguments": {"keyword": "Gangnam"}}));
    for body in ["", "not json at all", call.as_str()] {
        let response = send(&gateway, Method::POST, "/mcp", body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(read_json(response).await, json!({"status": "healthy"}));
    }

    assert_eq!(fake.call_count(), 0);
    assert_eq!(gateway.registry().count(), 0);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let fake = FakeTransit::default();
    let gateway = gateway_with(fake.clone(), TokenlessPost::Probe);

    let call = rpc(1, "tools/call", json!({"name": "search_station", "arguments": {"keyword": "x"}}));
    let response = send(&gateway, Method::POST, "/mcp?session_id=nope", &call).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["error"], "session not found");
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_full_session_over_stream() {
    let gateway = gateway();
    let (mut stream, endpoint) = EventStream::open(&gateway, "/mcp").await;
    assert!(endpoint.starts_with("/mcp?session_id="));
    assert_eq!(gateway.registry().count(), 1);

    let response = send(&gateway, Method::POST, &endpoint, &initialize()).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let ack = stream.next_message().await;
    assert_eq!(ack["id"], 0);
    assert_eq!(ack["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(ack["result"]["serverInfo"]["name"], "BusRam");

    let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let response = send(&gateway, Method::POST, &endpoint, &note).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    send(&gateway, Method::POST, &endpoint, &rpc(1, "tools/list", json!({}))).await;
    let list = stream.next_message().await;
    assert_eq!(list["id"], 1);
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 2);

    let call = rpc(2, "tools/call", json!({"name": "search_station", "arguments": {"keyword": "Gangnam"}}));
    let response = send(&gateway, Method::POST, &endpoint, &call).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let result = stream.next_message().await;
    assert_eq!(result["id"], 2);
    let text = result["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Gangnam"));
    assert!(text.contains("121000977"));
}

#[tokio::test]
async fn test_unregistered_tool_is_reported_as_text() {
    let fake = FakeTransit::default();
    let gateway = gateway_with(fake.clone(), TokenlessPost::Probe);
    let (mut stream, endpoint) = EventStream::open(&gateway, "/mcp").await;

    send(&gateway, Method::POST, &endpoint, &initialize()).await;
    stream.next_message().await;

    let call = rpc(5, "tools/call", json!({"name": "delete_everything", "arguments": {}}));
    send(&gateway, Method::POST, &endpoint, &call).await;

    let result = stream.next_message().await;
    assert_eq!(result["result"]["isError"], true);
    assert!(result["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Unknown tool"));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_call_before_handshake_is_error_event() {
    let gateway = gateway();
    let (mut stream, endpoint) = EventStream::open(&gateway, "/mcp").await;

    let response = send(&gateway, Method::POST, &endpoint, &rpc(1, "tools/list", json!({}))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let event = stream.next_message().await;
    assert_eq!(event["id"], 1);
    assert_eq!(event["error"]["code"], JsonRpcError::INVALID_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let gateway = gateway();
    let (_stream, endpoint) = EventStream::open(&gateway, "/mcp").await;

    let response = send(&gateway, Method::POST, &endpoint, "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], JsonRpcError::PARSE_ERROR);

    // The session survives
    assert_eq!(gateway.registry().count(), 1);
    let response = send(&gateway, Method::POST, &endpoint, &initialize()).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_requested_id_conflict() {
    let gateway = gateway();
    let (_stream, endpoint) = EventStream::open(&gateway, "/mcp?session_id=fixed").await;
    assert_eq!(endpoint, "/mcp?session_id=fixed");

    let response = send(&gateway, Method::GET, "/mcp?session_id=fixed", "").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_disconnect_releases_session() {
    let gateway = gateway();
    let (stream, endpoint) = EventStream::open(&gateway, "/mcp").await;
    drop(stream);

    wait_until_empty(&gateway).await;

    let response = send(&gateway, Method::POST, &endpoint, &initialize()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disconnect_during_tool_call() {
    let fake = FakeTransit::default().with_delay("121000977", Duration::from_millis(300));
    let gateway = gateway_with(fake.clone(), TokenlessPost::Probe);
    let (mut stream, endpoint) = EventStream::open(&gateway, "/mcp").await;

    send(&gateway, Method::POST, &endpoint, &initialize()).await;
    stream.next_message().await;

    let call = rpc(
        3,
        "tools/call",
        json!({"name": "check_arrival", "arguments": {"city_code": "11", "station_id": "121000977"}}),
    );
    let pending = {
        let gateway = Arc::clone(&gateway);
        let endpoint = endpoint.clone();
        tokio::spawn(async move { send(&gateway, Method::POST, &endpoint, &call).await.status() })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);

    assert_eq!(pending.await.unwrap(), StatusCode::NOT_FOUND);
    wait_until_empty(&gateway).await;
}

#[tokio::test]
async fn test_default_session_mode_still_requires_handshake() {
    let gateway = gateway_with(FakeTransit::default(), TokenlessPost::DefaultSession);

    // Nothing bound to the default id yet
    let response = send(&gateway, Method::POST, "/mcp", &rpc(1, "tools/list", json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (mut stream, _) = EventStream::open(&gateway, "/mcp?session_id=default").await;

    let response = send(&gateway, Method::POST, "/mcp", &rpc(1, "tools/list", json!({}))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let event = stream.next_message().await;
    assert!(event.get("error").is_some());

    send(&gateway, Method::POST, "/mcp", &initialize()).await;
    let ack = stream.next_message().await;
    assert!(ack.get("result").is_some());
}

#[tokio::test]
async fn test_liveness_routes() {
    let gateway = gateway();

    let response = send(&gateway, Method::GET, "/", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({"status": "Bus MCP Server is Running!"})
    );

    let response = send(&gateway, Method::GET, "/health", "").await;
    assert_eq!(read_json(response).await["status"], "healthy");

    let response = send(&gateway, Method::GET, "/metrics", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_text(response).await.contains("busram_active_sessions 0"));
}

#[tokio::test]
async fn test_unknown_path_and_method() {
    let gateway = gateway();

    let response = send(&gateway, Method::GET, "/nope", "").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&gateway, Method::DELETE, "/mcp", "").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(response.headers().contains_key(header::ALLOW));
}

#[tokio::test]
async fn test_preflight() {
    let gateway = gateway();
    let response = send(&gateway, Method::OPTIONS, "/mcp", "").await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "*");
}

/// Body whose first poll panics
struct ExplodingBody;

impl Body for ExplodingBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        panic!("body exploded");
    }
}

#[tokio::test]
async fn test_panicking_route_becomes_500() {
    let gateway = gateway();
    let (_session, _channels) = gateway
        .registry()
        .create(Some(busram_protocol::SessionId::from("boom")))
        .unwrap();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/mcp?session_id=boom")
        .body(ExplodingBody)
        .unwrap();
    let response = dispatch(Arc::clone(&gateway), req).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Still serving
    let response = send(&gateway, Method::GET, "/health", "").await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Body that never ends, one 64 KiB chunk per poll
struct EndlessBody;

static CHUNK: [u8; 64 * 1024] = [b' '; 64 * 1024];

impl Body for EndlessBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(&CHUNK)))))
    }
}

#[tokio::test]
async fn test_endless_body_is_cut_off_at_limit() {
    let gateway = gateway();
    let (mut stream, endpoint) = EventStream::open(&gateway, "/mcp").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri(&endpoint)
        .body(EndlessBody)
        .unwrap();
    let response = timeout(Duration::from_secs(3), dispatch(Arc::clone(&gateway), req))
        .await
        .expect("body read was not bounded")
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    // Session unaffected
    let response = send(&gateway, Method::POST, &endpoint, &initialize()).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(stream.next_message().await.get("result").is_some());
}

#[tokio::test]
async fn test_declared_oversized_body_is_rejected() {
    let gateway = gateway();
    let (_stream, endpoint) = EventStream::open(&gateway, "/mcp").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri(&endpoint)
        .header(header::CONTENT_LENGTH, (MAX_BODY_BYTES + 1).to_string())
        .body(Full::new(Bytes::from_static(b"{}")))
        .unwrap();
    let response = dispatch(Arc::clone(&gateway), req).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn test_unframeable_event_becomes_error_for_same_id() {
    let huge = "x".repeat(MAX_BODY_BYTES + 16);
    let event = OutboundEvent::result(
        EventKind::ToolCallResponse,
        json!(9),
        json!({"content": [{"type": "text", "text": huge}]}),
    );

    let frame = encode_frame(event).unwrap().into_data().unwrap();
    let mut buf = BytesMut::from(&frame[..]);
    let decoded = SseDecoder::new().decode(&mut buf).unwrap().unwrap();

    assert_eq!(decoded.event.as_deref(), Some("message"));
    let reply: Value = serde_json::from_str(&decoded.data).unwrap();
    assert_eq!(reply["id"], 9);
    assert_eq!(reply["error"]["code"], JsonRpcError::INTERNAL_ERROR);
    assert!(reply.get("result").is_none());
}
