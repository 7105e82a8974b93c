use crate::config::XFrameOptions;
use crate::http::headers::HeaderMap;
use bytes::{Bytes, BytesMut};
use httpdate::fmt_http_date;
use std::time::{Duration, SystemTime};

/// Value of the `Server` header.
pub const SERVER_NAME: &str = "UR Web Server";

/// HTTP status codes produced by the server.
///
/// - `Ok` (200): File sent
/// - `PartialContent` (206): Byte range of a media file sent
/// - `MovedPermanently` (301): Directory redirect
/// - `NotModified` (304): Conditional GET, client copy is fresh
/// - `NotFound` (404): No file behind the target
/// - `RangeNotSatisfiable` (416): Range outside the file
/// - `ServiceUnavailable` (503): Resource or server temporarily unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 206 Partial Content
    PartialContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 304 Not Modified
    NotModified,
    /// 404 Not Found
    NotFound,
    /// 416 Range Not Satisfiable
    RangeNotSatisfiable,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use ur_web::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::PartialContent => 206,
            StatusCode::MovedPermanently => 301,
            StatusCode::NotModified => 304,
            StatusCode::NotFound => 404,
            StatusCode::RangeNotSatisfiable => 416,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use ur_web::http::response::StatusCode;
    /// assert_eq!(StatusCode::PartialContent.reason_phrase(), "Partial Content");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::NotModified => "Not Modified",
            StatusCode::NotFound => "Not Found",
            StatusCode::RangeNotSatisfiable => "Range Not Satisfiable",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// 304 never carries a body, so its length needs no announcement.
    fn allows_body(&self) -> bool {
        !matches!(self, StatusCode::NotModified)
    }
}

/// Accumulates the header fields of one response and serializes them.
///
/// Serialization always stamps `Date` and `Server`, adds `X-Frame-Options`
/// when configured, and forces `Connection: close` when no `Content-Length`
/// was set, since the client could not find the end of the body otherwise.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    status: StatusCode,
    fields: HeaderMap,
    content_length: Option<u64>,
    x_frame_options: XFrameOptions,
}

impl ResponseHeaders {
    /// Creates an empty `200 OK` header set.
    pub fn new(x_frame_options: XFrameOptions) -> Self {
        Self {
            status: StatusCode::Ok,
            fields: HeaderMap::new(),
            content_length: None,
            x_frame_options,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Length parsed from the last `Content-Length` set, or recorded by `set_info`.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    /// Sets or overwrites a field. Setting `Content-Length` also updates the
    /// cached length.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name.eq_ignore_ascii_case("Content-Length") {
            self.content_length = value.trim().parse().ok();
        }
        self.fields.insert(name, value);
    }

    /// Records status and body length of a response written without fields.
    pub fn set_info(&mut self, status: StatusCode, content_length: u64) {
        self.status = status;
        self.content_length = Some(content_length);
    }

    /// Preset for a file or stream body.
    ///
    /// No-cache resources get `Cache-Control: no-cache,no-store` and an
    /// `Expires` one hour in the past.
    pub fn initialize(
        &mut self,
        content_type: Option<&str>,
        content_length: u64,
        last_modified: Option<&str>,
        no_cache: bool,
    ) {
        if let Some(content_type) = content_type {
            self.add("Content-Type", content_type);
        }
        if let Some(last_modified) = last_modified.filter(|value| !value.is_empty()) {
            self.add("Last-Modified", last_modified);
        }
        self.add("Content-Length", content_length.to_string());

        if no_cache {
            self.add("Cache-Control", "no-cache,no-store");
            let past = SystemTime::now() - Duration::from_secs(60 * 60);
            self.add("Expires", fmt_http_date(past));
        }
    }

    /// Preset for a JSON body; never cached.
    pub fn initialize_json(&mut self, content_length: u64) {
        self.add("Content-Length", content_length.to_string());
        self.add("Content-Type", "application/json; charset=UTF-8");
        self.add("Cache-Control", "no-cache,no-store");
    }

    /// The serialized response tells the client the connection ends.
    pub fn closes_connection(&self) -> bool {
        self.fields
            .get("Connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
    }

    /// Serializes status line and header block for `version` (e.g.
    /// "HTTP/1.1"). A `payload` is appended to the same buffer so small
    /// responses go out in a single write.
    pub fn access(&mut self, version: &str, payload: Option<&[u8]>) -> Bytes {
        if !self.fields.contains("Content-Length") && self.status.allows_body() {
            self.fields.insert("Connection", "close");
        }
        self.fields.insert("Date", fmt_http_date(SystemTime::now()));
        self.fields.insert("Server", SERVER_NAME);
        if let Some(value) = self.x_frame_options.header_value() {
            self.fields.insert("X-Frame-Options", value);
        }

        let payload = payload.unwrap_or_default();
        let mut buf = BytesMut::with_capacity(256 + payload.len());

        // Status line
        buf.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                version,
                self.status.as_u16(),
                self.status.reason_phrase()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.fields.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        // Header/body separator
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_is_cached() {
        let mut headers = ResponseHeaders::new(XFrameOptions::NotSet);
        headers.add("content-length", "42");
        assert_eq!(headers.content_length(), Some(42));
    }

    #[test]
    fn not_modified_keeps_connection_open() {
        let mut headers = ResponseHeaders::new(XFrameOptions::NotSet);
        headers.set_info(StatusCode::NotModified, 0);
        let text = String::from_utf8(headers.access("HTTP/1.1", None).to_vec()).unwrap();

        assert!(text.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(!text.contains("Connection"));
    }
}
