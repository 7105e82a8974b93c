use crate::http::encoding::ContentEncoding;
use crate::http::headers::HeaderMap;

/// HTTP request methods.
///
/// Only GET, POST and HEAD are told apart. Anything else is `UNDEFINED` and
/// still served like a GET for a static resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Treated like GET, the request body is discarded
    POST,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// Any other method token
    UNDEFINED,
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// # Example
    ///
    /// ```
    /// # use ur_web::http::request::Method;
    /// assert_eq!(Method::from_token("HEAD"), Method::HEAD);
    /// assert_eq!(Method::from_token("PUT"), Method::UNDEFINED);
    /// ```
    pub fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "HEAD" => Method::HEAD,
            _ => Method::UNDEFINED,
        }
    }
}

/// Request line and header fields of one framed request.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    /// The HTTP method
    pub method: Method,
    /// Raw request target, including query and fragment
    pub url: String,
    /// Protocol version string as sent (e.g. "HTTP/1.1")
    pub version: String,
    /// Client speaks HTTP/1.0
    pub http10: bool,
    /// Header fields, case-insensitive
    pub headers: HeaderMap,
}

impl RequestHeaders {
    pub fn new(method: Method, url: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            method,
            url: url.into(),
            http10: version.eq_ignore_ascii_case("http/1.0"),
            version,
            headers: HeaderMap::new(),
        }
    }

    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn host(&self) -> Option<&str> {
        self.header("Host").filter(|host| !host.is_empty())
    }

    /// Compression negotiated from `Accept-Encoding`; deflate wins over gzip.
    pub fn content_encoding(&self) -> ContentEncoding {
        ContentEncoding::negotiate(self.header("Accept-Encoding"))
    }

    /// Length of the request body announced by `Content-Length`, 0 if absent or invalid.
    pub fn content_length(&self) -> u64 {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// An explicit `Connection: close` or `keep-alive` token decides; without
    /// one HTTP/1.1 defaults to keep-alive and HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.header("Connection")
                .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
                .unwrap_or(false)
        };

        if has_token("close") {
            false
        } else if has_token("keep-alive") {
            true
        } else {
            !self.http10
        }
    }

    /// Version string for the response status line.
    pub fn response_version(&self) -> &'static str {
        if self.http10 { "HTTP/1.0" } else { "HTTP/1.1" }
    }
}
