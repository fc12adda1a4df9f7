//! Reverse-proxy forwarding for one funnel exchange
//!
//! Both bodies are fully buffered: the inbound body so it can be captured
//! and replayed to the local target, the outbound body so it can be captured
//! and re-emitted with an explicit length. Memory use per exchange is
//! bounded only by the payload sizes.

use bytes::Bytes;
use chrono::Utc;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version};
use hyper_util::rt::TokioIo;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::capture::{CaptureRecord, HeaderSnapshot, RequestSnapshot, ResponseSnapshot};
use crate::directory::{Funnel, FunnelDirectory};
use crate::error::{FunnelError, Result};
use crate::notify::NotificationSink;
use crate::router::{join_paths, join_query, RoutedPath};

/// Response body type produced by the ingress
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Fully read response from the local target
struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// Exchange that did not produce a response for the requester
struct FailedExchange {
    error: FunnelError,
    /// Headers the target sent before its body could not be read
    upstream_headers: Option<HeaderMap>,
}

impl From<FunnelError> for FailedExchange {
    fn from(error: FunnelError) -> Self {
        Self {
            error,
            upstream_headers: None,
        }
    }
}

/// Forwards exchanges to funnel targets and records them
pub struct Forwarder {
    directory: Arc<FunnelDirectory>,
    sink: NotificationSink,
    capture_body_limit: Option<usize>,
}

impl Forwarder {
    pub fn new(directory: Arc<FunnelDirectory>, sink: NotificationSink) -> Self {
        Self {
            directory,
            sink,
            capture_body_limit: None,
        }
    }

    /// Only keep the first `limit` bytes of each body in the capture history
    pub fn with_capture_body_limit(mut self, limit: Option<usize>) -> Self {
        self.capture_body_limit = limit;
        self
    }

    pub fn directory(&self) -> &Arc<FunnelDirectory> {
        &self.directory
    }

    /// Forward one exchange to the funnel named in `routed`
    ///
    /// Resolution failures return before anything is captured. Once the
    /// funnel is resolved the exchange is always captured and announced,
    /// including when the local target fails.
    pub async fn forward<B>(
        &self,
        req: Request<B>,
        routed: &RoutedPath,
        remote_addr: SocketAddr,
    ) -> Result<Response<ProxyBody>>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let started = Instant::now();
        let timestamp = Utc::now();

        let funnel = self.directory.get(&routed.funnel_id)?;
        let target = Self::parse_target(&funnel)?;

        let (parts, body) = req.into_parts();
        let had_length = parts.headers.contains_key(CONTENT_LENGTH);

        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(
                    "Error reading request body for funnel {}: {}",
                    funnel.id(),
                    e
                );
                Bytes::new()
            }
        };

        let url = Self::outbound_url(&target, &routed.rest, parts.uri.query());
        let headers = Self::outbound_headers(
            &parts.headers,
            &target,
            remote_addr,
            body_bytes.len(),
            had_length,
        );

        debug!("Forwarding {} {} for funnel {}", parts.method, url, funnel.id());

        let request_snapshot = RequestSnapshot {
            method: parts.method.to_string(),
            url: url.to_string(),
            headers: flatten_headers(&headers),
            body: self.captured(&body_bytes),
        };

        let outcome = Self::exchange(parts.method.clone(), &url, headers, body_bytes).await;

        let response_snapshot = match &outcome {
            Ok(buffered) => ResponseSnapshot {
                status: buffered.status.as_u16(),
                headers: flatten_headers(&buffered.headers),
                body: self.captured(&buffered.body),
            },
            Err(failed) => {
                warn!("Exchange for funnel {} failed: {}", funnel.id(), failed.error);
                ResponseSnapshot {
                    status: failed.error.status_code().as_u16(),
                    headers: failed
                        .upstream_headers
                        .as_ref()
                        .map(flatten_headers)
                        .unwrap_or_default(),
                    ..ResponseSnapshot::default()
                }
            }
        };

        self.record(
            &funnel,
            CaptureRecord {
                id: Uuid::new_v4().to_string(),
                funnel_id: funnel.id().to_string(),
                timestamp,
                duration: started.elapsed(),
                request: request_snapshot,
                response: response_snapshot,
            },
        );

        outcome.map_err(|failed| failed.error).map(|buffered| {
            let mut response = Response::new(full_body(buffered.body));
            *response.status_mut() = buffered.status;
            *response.headers_mut() = buffered.headers;
            response
        })
    }

    fn record(&self, funnel: &Funnel, record: CaptureRecord) {
        funnel.captures.add(record);
        self.sink.notify(funnel.id());
    }

    fn captured(&self, body: &Bytes) -> Bytes {
        match self.capture_body_limit {
            Some(limit) if body.len() > limit => body.slice(..limit),
            _ => body.clone(),
        }
    }

    /// Validate the funnel's local target
    fn parse_target(funnel: &Funnel) -> Result<Url> {
        let raw = funnel.local_target();
        if raw.is_empty() {
            return Err(FunnelError::NotReady(funnel.id().to_string()));
        }

        let parse_error = |reason: String| {
            warn!("Error parsing target URL {:?}: {}", raw, reason);
            FunnelError::TargetParse {
                target: raw.to_string(),
                reason,
            }
        };

        let url = Url::parse(raw).map_err(|e| parse_error(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(parse_error(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(parse_error("missing host".to_string()));
        }

        Ok(url)
    }

    /// Target URL with `rest` appended to its path and queries merged
    fn outbound_url(target: &Url, rest: &str, query: Option<&str>) -> Url {
        let mut url = target.clone();
        url.set_path(&join_paths(target.path(), rest));
        url.set_query(join_query(target.query(), query).as_deref());
        url.set_fragment(None);
        url
    }

    /// Inbound headers rewritten for the hop to the local target
    fn outbound_headers(
        inbound: &HeaderMap,
        target: &Url,
        remote_addr: SocketAddr,
        body_len: usize,
        had_length: bool,
    ) -> HeaderMap {
        let mut headers = inbound.clone();
        strip_hop_by_hop(&mut headers);

        let original_host = headers.remove(HOST);
        if let Ok(host) = HeaderValue::from_str(&authority(target)) {
            headers.insert(HOST, host);
        }

        let mut forwarded_for: Vec<String> = headers
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .collect();
        forwarded_for.push(remote_addr.ip().to_string());
        if let Ok(value) = HeaderValue::from_str(&forwarded_for.join(", ")) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }

        if let Some(host) = original_host {
            if !headers.contains_key(&X_FORWARDED_HOST) {
                headers.insert(X_FORWARDED_HOST.clone(), host);
            }
        }
        if !headers.contains_key(&X_FORWARDED_PROTO) {
            headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));
        }

        headers.remove(CONTENT_LENGTH);
        if body_len > 0 || had_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
        }

        headers
    }

    /// Send the buffered request and buffer the target's response
    async fn exchange(
        method: Method,
        url: &Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> std::result::Result<BufferedResponse, FailedExchange> {
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{}:{}", host, port);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| FunnelError::UpstreamUnavailable(format!("{}: {}", addr, e)))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| FunnelError::UpstreamUnavailable(format!("{}: {}", addr, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Target connection error: {}", e);
            }
        });

        let uri: Uri = origin_form(url)
            .parse()
            .map_err(|e| FunnelError::UpstreamUnavailable(format!("invalid request URI: {}", e)))?;

        let head_only = method == Method::HEAD;
        let mut request = Request::new(Full::new(body));
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        *request.headers_mut() = headers;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| FunnelError::UpstreamUnavailable(format!("{}: {}", addr, e)))?;

        let (parts, body) = response.into_parts();
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return Err(FailedExchange {
                    error: FunnelError::UpstreamRead(e.to_string()),
                    upstream_headers: Some(headers),
                })
            }
        };

        let bodiless = head_only
            || parts.status == StatusCode::NO_CONTENT
            || parts.status == StatusCode::NOT_MODIFIED;
        if !bodiless {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        Ok(BufferedResponse {
            status: parts.status,
            headers,
            body: Bytes::copy_from_slice(&body),
        })
    }
}

/// Remove hop-by-hop headers, including any named in `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in named.iter().map(String::as_str).chain(HOP_BY_HOP) {
        headers.remove(name);
    }
}

/// `host[:port]` of a URL, port only when explicit
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Path and query of a URL, as sent on the request line
fn origin_form(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// One entry per header name, repeated values joined with `,`
fn flatten_headers(headers: &HeaderMap) -> HeaderSnapshot {
    let mut flat = HeaderSnapshot::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        flat.insert(name.as_str().to_string(), joined);
    }
    flat
}

/// Create full body
pub fn full_body(bytes: Bytes) -> ProxyBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Create plain-text response
pub fn text_response(status: StatusCode, body: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FunnelDescriptor;
    use hyper::body::Frame;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn peer() -> SocketAddr {
        "203.0.113.7:51000".parse().unwrap()
    }

    fn forwarder_for(id: &str, local_target: &str) -> (Forwarder, Arc<FunnelDirectory>) {
        let directory = Arc::new(FunnelDirectory::new());
        directory.add(FunnelDescriptor::new(id, local_target, "https://f.example.net"));
        (
            Forwarder::new(directory.clone(), NotificationSink::disabled()),
            directory,
        )
    }

    fn request(method: &str, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, "f.example.net")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    struct FailingBody;

    impl Body for FailingBody {
        type Data = Bytes;
        type Error = io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<std::result::Result<Frame<Bytes>, io::Error>>> {
            Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            ))))
        }
    }

    #[test]
    fn test_outbound_url() {
        let target = Url::parse("http://localhost:9000").unwrap();
        assert_eq!(
            Forwarder::outbound_url(&target, "a/b", Some("x=1")).as_str(),
            "http://localhost:9000/a/b?x=1"
        );
        assert_eq!(
            Forwarder::outbound_url(&target, "", None).as_str(),
            "http://localhost:9000/"
        );

        let target = Url::parse("http://localhost:9000/api?key=k").unwrap();
        assert_eq!(
            Forwarder::outbound_url(&target, "/users", Some("page=2")).as_str(),
            "http://localhost:9000/api/users?key=k&page=2"
        );
        assert_eq!(
            Forwarder::outbound_url(&target, "", None).as_str(),
            "http://localhost:9000/api?key=k"
        );
    }

    #[test]
    fn test_outbound_url_keeps_rest_verbatim() {
        let target = Url::parse("http://localhost:9000/api").unwrap();
        for rest in ["a//b", "a/%20b", "a/...", "..hidden/x", "a/%2e%2ex"] {
            let routed = RoutedPath::parse(&format!("f1/{}", rest)).unwrap();
            let url = Forwarder::outbound_url(&target, &routed.rest, None);
            assert_eq!(url.path(), format!("/api/{}", rest), "rest {:?}", rest);
        }
    }

    #[test]
    fn test_outbound_headers_rewrite() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("f.example.net"));
        inbound.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-hop"));
        inbound.insert("x-hop", HeaderValue::from_static("1"));
        inbound.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        inbound.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1"));
        inbound.insert("authorization", HeaderValue::from_static("Bearer t"));

        let target = Url::parse("http://localhost:9000/base").unwrap();
        let headers = Forwarder::outbound_headers(&inbound, &target, peer(), 4, false);

        assert_eq!(headers[HOST], "localhost:9000");
        assert_eq!(headers["x-forwarded-for"], "198.51.100.1, 203.0.113.7");
        assert_eq!(headers["x-forwarded-host"], "f.example.net");
        assert_eq!(headers["x-forwarded-proto"], "http");
        assert_eq!(headers[CONTENT_LENGTH], "4");
        assert_eq!(headers["authorization"], "Bearer t");
        assert!(!headers.contains_key("x-hop"));
        assert!(!headers.contains_key(CONNECTION));
        assert!(!headers.contains_key("transfer-encoding"));
    }

    #[test]
    fn test_empty_body_without_length_sends_no_length() {
        let target = Url::parse("http://localhost:9000").unwrap();
        let headers = Forwarder::outbound_headers(&HeaderMap::new(), &target, peer(), 0, false);
        assert!(!headers.contains_key(CONTENT_LENGTH));

        let headers = Forwarder::outbound_headers(&HeaderMap::new(), &target, peer(), 0, true);
        assert_eq!(headers[CONTENT_LENGTH], "0");
    }

    #[test]
    fn test_flatten_headers_joins_values() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        let flat = flatten_headers(&headers);
        assert_eq!(flat["accept"], "text/html,application/json");
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let (forwarder, directory) = forwarder_for("ready", "http://127.0.0.1:1");
        directory.add(FunnelDescriptor::new("pending", "", ""));
        directory.add(FunnelDescriptor::new("broken", "::not a url::", ""));
        directory.add(FunnelDescriptor::new("tls", "https://localhost:8443", ""));

        let routed = |id: &str| RoutedPath::parse(&format!("{}/x", id)).unwrap();

        let err = forwarder
            .forward(request("GET", "/x", ""), &routed("missing"), peer())
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::FunnelNotFound(_)));

        let err = forwarder
            .forward(request("GET", "/x", ""), &routed("pending"), peer())
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::NotReady(_)));

        for id in ["broken", "tls"] {
            let err = forwarder
                .forward(request("GET", "/x", ""), &routed(id), peer())
                .await
                .unwrap_err();
            assert!(matches!(err, FunnelError::TargetParse { .. }), "{}", id);
            assert!(directory.get(id).unwrap().captures.is_empty());
        }
    }

    #[tokio::test]
    async fn test_forward_and_capture() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/b"))
            .and(query_param("x", "1"))
            .and(body_string("ping"))
            .and(header("x-forwarded-for", "203.0.113.7"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("content-type", "application/json")
                    .set_body_string("{\"ok\":true}"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (forwarder, directory) = forwarder_for("f1", &server.uri());
        let routed = RoutedPath::parse("f1/a/b").unwrap();

        let response = forwarder
            .forward(request("POST", "/funnelgate/f1/a/b?x=1", "ping"), &routed, peer())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_LENGTH], "11");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"{\"ok\":true}");

        let funnel = directory.get("f1").unwrap();
        let record = funnel.captures.head().unwrap();
        assert_eq!(record.funnel_id, "f1");
        assert_eq!(record.request.method, "POST");
        assert_eq!(record.request.url, format!("{}/a/b?x=1", server.uri()));
        assert_eq!(&record.request.body[..], b"ping");
        assert_eq!(record.response.status, 201);
        assert_eq!(&record.response.body[..], b"{\"ok\":true}");
        assert_eq!(record.kind(), "json");
    }

    #[tokio::test]
    async fn test_capture_body_limit_only_truncates_capture() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("0123456789"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abcdefghij"))
            .mount(&server)
            .await;

        let (forwarder, directory) = forwarder_for("f1", &server.uri());
        let forwarder = forwarder.with_capture_body_limit(Some(4));
        let routed = RoutedPath::parse("f1/").unwrap();

        let response = forwarder
            .forward(request("POST", "/", "0123456789"), &routed, peer())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"abcdefghij");

        let record = directory.get("f1").unwrap().captures.head().unwrap();
        assert_eq!(&record.request.body[..], b"0123");
        assert_eq!(&record.response.body[..], b"abcd");
    }

    #[tokio::test]
    async fn test_request_body_failure_forwards_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (forwarder, directory) = forwarder_for("f1", &server.uri());
        let routed = RoutedPath::parse("f1/item").unwrap();
        let req = Request::builder().method("PUT").uri("/item").body(FailingBody).unwrap();

        let response = forwarder.forward(req, &routed, peer()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let record = directory.get("f1").unwrap().captures.head().unwrap();
        assert!(record.request.body.is_empty());
        assert_eq!(record.response.status, 204);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_captured() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (forwarder, directory) = forwarder_for("f1", &format!("http://127.0.0.1:{}", port));
        let routed = RoutedPath::parse("f1/x").unwrap();

        let err = forwarder
            .forward(request("GET", "/x", ""), &routed, peer())
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::UpstreamUnavailable(_)));

        let record = directory.get("f1").unwrap().captures.head().unwrap();
        assert_eq!(record.response.status, 502);
        assert!(record.response.headers.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_response_body_aborts_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nX-Served-By: app\r\n\r\nshort")
                .await;
            // close before the promised length arrives
        });

        let (forwarder, directory) = forwarder_for("f1", &format!("http://127.0.0.1:{}", port));
        let routed = RoutedPath::parse("f1/x").unwrap();

        let err = forwarder
            .forward(request("GET", "/x", ""), &routed, peer())
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::UpstreamRead(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let record = directory.get("f1").unwrap().captures.head().unwrap();
        assert_eq!(record.response.status, 500);
        assert_eq!(record.response.headers["x-served-by"], "app");
        assert!(record.response.body.is_empty());
    }

    #[tokio::test]
    async fn test_chunked_response_gets_explicit_length() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
                )
                .await;
        });

        let (forwarder, _directory) =
            forwarder_for("f1", &format!("http://127.0.0.1:{}", port));
        let routed = RoutedPath::parse("f1/").unwrap();

        let response = forwarder
            .forward(request("GET", "/", ""), &routed, peer())
            .await
            .unwrap();
        assert!(!response.headers().contains_key("transfer-encoding"));
        assert_eq!(response.headers()[CONTENT_LENGTH], "11");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello world");
    }
}
