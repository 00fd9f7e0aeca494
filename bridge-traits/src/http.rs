//! HTTP Client Abstraction
//!
//! Provides the network transport capability the cache engine sits in front
//! of. A transport resolves a request with a response or fails; it never
//! retries on its own.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Parse a method name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "HEAD" => Some(HttpMethod::Head),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Only GET counts as a cacheable read.
    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the client issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Loading a full page/document.
    Navigate,
    /// Any sub-resource fetch (scripts, images, manifests, API calls).
    #[default]
    Subresource,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            mode: RequestMode::default(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// A GET issued as a page navigation.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::get(url).mode(RequestMode::Navigate)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Visibility of a response body to the requesting page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Same-origin response, fully readable.
    #[default]
    Basic,
    /// Cross-origin response that passed CORS checks.
    Cors,
    /// Cross-origin response whose status and body are hidden.
    Opaque,
}

/// HTTP response
///
/// Deliberately not `Clone`: a response handed to a caller is consumed by
/// that caller. Use [`HttpResponse::duplicate`] when a second reader is
/// needed.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl HttpResponse {
    /// Build a basic response with the canonical reason phrase for `status`.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Produce an independent copy of this response.
    ///
    /// The body buffer is shared by reference count, so both copies can be
    /// read in full without either consuming the other.
    pub fn duplicate(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            response_type: self.response_type,
        }
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| {
            crate::error::BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e))
        })
    }
}

/// Reason phrase for the status codes the engine produces or commonly sees.
pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// Async HTTP client trait
///
/// This trait abstracts the network transport so the engine can run against
/// a native client, a browser fetch shim, or a scripted test double.
/// Implementations should:
/// - Perform exactly one attempt per call (no retry or backoff)
/// - Map connection failures to `BridgeError::Network`
/// - Map deadline expiry to `BridgeError::Timeout`
/// - Return non-2xx statuses as `Ok` responses, not errors
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch_shell(client: &dyn HttpClient) -> Result<String> {
///     let response = client.execute(HttpRequest::get("https://app.example/index.html")).await?;
///     response.text()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - Request times out
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::get("https://example.com")
            .header("User-Agent", "test")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert!(!request.is_navigation());
    }

    #[test]
    fn test_navigate_request() {
        let request = HttpRequest::navigate("https://example.com/");
        assert!(request.is_navigation());
        assert!(request.method.is_read());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("BREW"), None);
        assert!(!HttpMethod::Post.is_read());
        assert!(!HttpMethod::Head.is_read());
    }

    #[test]
    fn test_http_response_defaults() {
        let response = HttpResponse::new(200, "test");

        assert_eq!(HttpResponse::new(404, "").status_text, "Not Found");
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.response_type, ResponseType::Basic);
    }

    #[test]
    fn test_duplicate_gives_independent_readers() {
        let original = HttpResponse::new(200, "shell")
            .with_header("content-type", "text/html")
            .with_type(ResponseType::Cors);
        let copy = original.duplicate();

        drop(original);

        assert_eq!(copy.text().unwrap(), "shell");
        assert_eq!(copy.headers.get("content-type").unwrap(), "text/html");
        assert_eq!(copy.response_type, ResponseType::Cors);
    }
}
