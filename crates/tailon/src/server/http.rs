//! Minimal HTTP/1.1 handling: request heads, routing under the relative
//! root, and `Connection: close` responses.

use anyhow::{Context, Result, bail};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::normalize_root;

const MAX_HEAD_SIZE: usize = 16 * 1024;
const MAX_HEADERS: usize = 64;
const CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// A parsed request head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method, e.g. `GET`
    pub method: String,
    /// Path without the query string
    pub path: String,
    /// Raw query string
    pub query: Option<String>,
    /// Header names and values in arrival order
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// First header with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the client asks to switch to WebSocket
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header("upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
        let connection = self.header("connection").is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        upgrade && connection && self.header("sec-websocket-key").is_some()
    }

    /// First value of a query parameter, percent-decoded
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Read and parse a request head.
///
/// Returns `None` if the peer closed the connection before sending
/// anything, otherwise the request and any bytes read past the head.
pub async fn read_request<S>(stream: &mut S) -> Result<Option<(Request, Vec<u8>)>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await.context("Failed to read request")?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            bail!("connection closed mid-request");
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some((request, len)) = parse_head(&buf)? {
            let rest = buf.split_off(len);
            return Ok(Some((request, rest)));
        }
        if buf.len() > MAX_HEAD_SIZE {
            bail!("request head exceeds {MAX_HEAD_SIZE} bytes");
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<(Request, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);

    let len = match parsed.parse(buf).context("Malformed request")? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let target = parsed.path.unwrap_or("/");
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    let request = Request {
        method: parsed.method.unwrap_or_default().to_string(),
        path,
        query,
        headers: parsed
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect(),
    };

    Ok(Some((request, len)))
}

/// Where a request path leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The index page
    Index,
    /// The WebSocket endpoint
    WebSocket,
    /// An embedded file below `vfs/`
    Asset(String),
    /// `files/?path=`
    Download,
    /// Anything else
    NotFound,
}

/// Maps request paths onto routes below the relative root
#[derive(Debug, Clone)]
pub struct Router {
    root: String,
}

impl Router {
    /// Router for the given relative root, normalized
    pub fn new(root: &str) -> Self {
        Self {
            root: normalize_root(root),
        }
    }

    /// The normalized root (`/` or `/a/.../`)
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Route a request path
    pub fn route(&self, path: &str) -> Route {
        if path == self.root || (self.root != "/" && path == self.root.trim_end_matches('/')) {
            return Route::Index;
        }

        let Some(rest) = path.strip_prefix(self.root.as_str()) else {
            return Route::NotFound;
        };

        match rest {
            "index.html" => Route::Index,
            "ws" => Route::WebSocket,
            _ if rest.starts_with("ws/") => Route::WebSocket,
            "files" | "files/" => Route::Download,
            _ => match rest.strip_prefix("vfs/") {
                Some(asset) if !asset.is_empty() => Route::Asset(asset.to_string()),
                _ => Route::NotFound,
            },
        }
    }
}

/// A buffered response
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: &'static str,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Response {
    /// Response with the given status and body
    pub fn new(status: u16, reason: &'static str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason,
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
        }
    }

    /// 200 with an HTML body
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, "OK", "text/html; charset=utf-8", body)
    }

    /// Plain text with the given status
    pub fn text(status: u16, reason: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, reason, "text/plain; charset=utf-8", body)
    }

    /// 400
    pub fn bad_request(message: &str) -> Self {
        Self::text(400, "Bad Request", format!("{message}\n"))
    }

    /// 403
    pub fn forbidden() -> Self {
        Self::text(403, "Forbidden", "Forbidden\n")
    }

    /// 404
    pub fn not_found() -> Self {
        Self::text(404, "Not Found", "Not Found\n")
    }

    /// 405
    pub fn method_not_allowed() -> Self {
        Self::text(405, "Method Not Allowed", "Method Not Allowed\n").with_header("Allow", "GET")
    }

    /// Add a header
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Write the full response
    pub async fn write_to<W>(&self, stream: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let head = response_head(self.status, self.reason, &self.headers, self.body.len() as u64);
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&self.body).await?;
        stream.flush().await
    }
}

/// Status line and headers, including the ones every response carries
pub fn response_head(status: u16, reason: &str, headers: &[(&'static str, String)], content_length: u64) -> String {
    let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("Content-Length: {content_length}\r\n"));
    head.push_str(&format!("Cache-Control: {CACHE_CONTROL}\r\n"));
    head.push_str("Connection: close\r\n\r\n");
    head
}

/// The `101 Switching Protocols` head for a WebSocket upgrade
pub fn upgrade_head(key: &str) -> String {
    let accept = tungstenite::handshake::derive_accept_key(key.as_bytes());
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_routes() {
        let router = Router::new("/");
        assert_eq!(router.route("/"), Route::Index);
        assert_eq!(router.route("/index.html"), Route::Index);
        assert_eq!(router.route("/ws"), Route::WebSocket);
        assert_eq!(router.route("/ws/123/abc/websocket"), Route::WebSocket);
        assert_eq!(router.route("/vfs/dist/main.js"), Route::Asset("dist/main.js".into()));
        assert_eq!(router.route("/files/"), Route::Download);
        assert_eq!(router.route("/vfs/"), Route::NotFound);
        assert_eq!(router.route("/wsx"), Route::NotFound);
    }

    #[test]
    fn test_nested_root_routes() {
        let router = Router::new("tailon/tailon");
        assert_eq!(router.root(), "/tailon/tailon/");
        assert_eq!(router.route("/tailon/tailon/"), Route::Index);
        assert_eq!(router.route("/tailon/tailon"), Route::Index);
        assert_eq!(router.route("/tailon/tailon/ws"), Route::WebSocket);
        assert_eq!(
            router.route("/tailon/tailon/vfs/dist/main.css"),
            Route::Asset("dist/main.css".into())
        );
        assert_eq!(router.route("/"), Route::NotFound);
        assert_eq!(router.route("/tailon/"), Route::NotFound);
        assert_eq!(router.route("/ws"), Route::NotFound);
    }

    #[test]
    fn test_parse_head() {
        let raw = b"GET /files/?path=%2Fvar%2Flog%2Fa.log HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\nrest";
        let (request, len) = parse_head(raw).unwrap().unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/files/");
        assert_eq!(request.query_param("path").as_deref(), Some("/var/log/a.log"));
        assert_eq!(request.header("upgrade"), Some("websocket"));
        assert!(!request.is_websocket_upgrade());
        assert_eq!(&raw[len..], b"rest");

        assert!(parse_head(b"GET / HTTP/1.1\r\nHost:").unwrap().is_none());
    }

    #[test]
    fn test_upgrade_detection() {
        let raw = b"GET /ws HTTP/1.1\r\nConnection: keep-alive, Upgrade\r\nUpgrade: WebSocket\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let (request, _) = parse_head(raw).unwrap().unwrap();
        assert!(request.is_websocket_upgrade());

        let head = upgrade_head(request.header("sec-websocket-key").unwrap());
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[test]
    fn test_response_headers() {
        let head = response_head(404, "Not Found", &[("Content-Type", "text/plain".into())], 10);
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(head.contains("Content-Length: 10\r\n"));
        assert!(head.contains("Cache-Control: no-store"));
        assert!(head.ends_with("Connection: close\r\n\r\n"));
    }
}
