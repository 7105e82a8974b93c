//! Request session
//!
//! One session per request: frames the header block, routes the target to
//! an [`Outcome`] and emits the matching response on the connection
//! transport.

use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::http::encoding::{ContentEncoding, compress, is_compressible};
use crate::http::mime;
use crate::http::parser::{ReadBuffer, read_header_frame};
use crate::http::range::{ByteRange, RangeRequest, parse_range};
use crate::http::request::{Method, RequestHeaders};
use crate::http::response::{ResponseHeaders, StatusCode};
use crate::http::writer::{RANGE_CHUNK_SIZE, ResponseWriter, SEND_CHUNK_SIZE};
use httpdate::{fmt_http_date, parse_http_date};
use percent_encoding::percent_decode_str;
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite};
use tracing::{debug, warn};

/// `If-Modified-Since` value answered with 304 for non-file streams.
pub const NOT_MODIFIED_SENTINEL: &str = "Fri, 01 Jun 2012 08:28:30 GMT";

const NOT_FOUND_HEAD: &str = "<title>Not Found</title>\
<style>html { font-family: sans-serif; } h1 { font-weight: 100; }</style>";
const NOT_FOUND_BODY: &str =
    "<h1>File not found</h1><p>The requested resource could not be found on the server.</p>";
const REDIRECT_BODY: &str = "<html><head><title>Moved permanently</title></head>\
<body><h1>Moved permanently</h1>The specified resource moved permanently.</body></html>";

/// Whether the transport stays open after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepAlive,
    Close,
}

/// How the requests of a connection are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// Files from the webroot
    Files,
    /// Every request is redirected to the TLS port
    RedirectToTls,
    /// Connection limit reached; the request gets 503 and the connection closes
    Overloaded,
}

/// Result of routing a request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    File(PathBuf),
    /// Target path (with query) or absolute URL to redirect to
    Redirect(String),
    NotFound,
    Unavailable,
}

pub struct RequestSession<'a, S> {
    config: &'a Config,
    stream: &'a mut S,
    request: RequestHeaders,
    response: ResponseHeaders,
    secure: bool,
    force_close: bool,
}

impl<'a, S> RequestSession<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Frames the next request from `buffer` and `stream`. Bytes past the
    /// header block stay in `buffer`; a request body is read and dropped.
    pub async fn receive(
        config: &'a Config,
        stream: &'a mut S,
        buffer: &mut ReadBuffer,
        secure: bool,
    ) -> SessionResult<Self> {
        let timeout = config.socket_timeout();
        let frame = read_header_frame(stream, buffer, timeout).await?;
        buffer.consume(frame.header_end);
        discard_body(stream, buffer, frame.request.content_length(), timeout).await?;

        Ok(Self {
            config,
            stream,
            request: frame.request,
            response: ResponseHeaders::new(config.x_frame_options),
            secure,
            force_close: false,
        })
    }

    pub fn response(&self) -> &ResponseHeaders {
        &self.response
    }

    /// Routes and answers the request, then reports whether the connection
    /// can carry another one.
    pub async fn respond(mut self, mode: ServeMode) -> SessionResult<Disposition> {
        if mode == ServeMode::Overloaded {
            self.force_close = true;
        }
        self.announce_persistence();

        let outcome = match mode {
            ServeMode::Files => self.route().await,
            ServeMode::RedirectToTls => Outcome::Redirect(self.tls_location()),
            ServeMode::Overloaded => Outcome::Unavailable,
        };

        self.answer(outcome).await?;

        debug!(
            method = ?self.request.method,
            url = %self.request.url,
            status = self.response.status().as_u16(),
            "Request served"
        );

        Ok(self.disposition())
    }

    /// Maps the target onto the webroot.
    ///
    /// Files are served as is, directory targets through their
    /// `index.html`. A directory target missing its trailing slash is
    /// redirected to the slashed form, a file target carrying one to the
    /// bare form.
    pub async fn route(&self) -> Outcome {
        let (path, query) = split_target(&self.request.url);

        if let Some(file) = self.check_file(path).await {
            return Outcome::File(file);
        }

        if !path.ends_with('/') {
            let slashed = format!("{path}/");
            return match self.check_file(&slashed).await {
                Some(_) => Outcome::Redirect(format!("{slashed}{query}")),
                None => Outcome::NotFound,
            };
        }

        if path.len() > 2 {
            let bare = &path[..path.len() - 1];
            if self.check_file(bare).await.is_some() {
                return Outcome::Redirect(format!("{bare}{query}"));
            }
        } else if path == "/" && is_file(&self.config.webroot.join("root").join("index.html")).await {
            return Outcome::Redirect("/root/".to_string());
        }

        Outcome::NotFound
    }

    /// Emits `outcome`, falling back to an empty 503 when its file cannot
    /// be read. The fallback leaves the connection usable.
    async fn answer(&mut self, outcome: Outcome) -> SessionResult<()> {
        match self.emit(outcome).await {
            Err(SessionError::Unavailable) => self.send_unavailable().await,
            other => other,
        }
    }

    async fn emit(&mut self, outcome: Outcome) -> SessionResult<()> {
        match outcome {
            Outcome::File(path) => self.send_file(&path).await,
            Outcome::Redirect(location) => self.send_redirect(&location).await,
            Outcome::NotFound => self.send_not_found().await,
            Outcome::Unavailable => Err(SessionError::Unavailable),
        }
    }

    /// Sends a file: media with a `Range` header through the range path,
    /// everything else through the plain conditional path.
    pub async fn send_file(&mut self, path: &Path) -> SessionResult<()> {
        if mime::is_range_capable(path) {
            if let Some(range) = self.request.header("Range").map(str::to_owned) {
                return self.send_range(path, &range).await;
            }
        }
        self.send_plain_file(path).await
    }

    async fn send_plain_file(&mut self, path: &Path) -> SessionResult<()> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unavailable(path, e))?;
        let no_cache = self.config.is_no_cache(path);
        let modified = metadata.modified().ok();

        if !no_cache {
            if let Some(modified) = modified {
                if self.not_modified_since(modified) {
                    return self.send_not_modified().await;
                }
            }
        }

        let file = File::open(path).await.map_err(|e| unavailable(path, e))?;
        let content_type = mime::content_type_for(path);
        let last_modified = modified.map(fmt_http_date);
        if mime::is_range_capable(path) {
            self.response.add("Accept-Ranges", "bytes");
        }

        self.send_body(
            file,
            metadata.len(),
            &content_type,
            last_modified.as_deref(),
            no_cache,
        )
        .await
    }

    /// Sends a body that is not backed by a webroot file.
    ///
    /// Freshness is checked against [`NOT_MODIFIED_SENTINEL`] only, not
    /// against a real modification time.
    pub async fn send_stream<R>(
        &mut self,
        body: R,
        length: u64,
        content_type: &str,
        last_modified: Option<&str>,
        no_cache: bool,
    ) -> SessionResult<()>
    where
        R: AsyncRead + Unpin,
    {
        if !no_cache && self.request.header("If-Modified-Since") == Some(NOT_MODIFIED_SENTINEL) {
            return self.send_not_modified().await;
        }
        self.send_body(body, length, content_type, last_modified, no_cache)
            .await
    }

    /// Sends a JSON document.
    pub async fn send_json(&mut self, body: &[u8]) -> SessionResult<()> {
        self.response.initialize_json(body.len() as u64);
        let payload = (!self.is_head()).then_some(body);
        let bytes = self
            .response
            .access(self.request.response_version(), payload);
        self.write_response(&bytes).await
    }

    async fn send_body<R>(
        &mut self,
        mut body: R,
        length: u64,
        content_type: &str,
        last_modified: Option<&str>,
        no_cache: bool,
    ) -> SessionResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let encoding = self.request.content_encoding();
        let version = self.request.response_version();

        if encoding != ContentEncoding::None && is_compressible(content_type) {
            let mut raw = Vec::with_capacity(length as usize);
            body.read_to_end(&mut raw).await?;
            let compressed = tokio::task::spawn_blocking(move || compress(&raw, encoding))
                .await
                .map_err(io::Error::other)??;

            if let Some(name) = encoding.name() {
                self.response.add("Content-Encoding", name);
            }
            self.prepare_body_headers(content_type, compressed.len() as u64, last_modified, no_cache);

            let payload = (!self.is_head()).then_some(compressed.as_slice());
            let bytes = self.response.access(version, payload);
            return self.write_response(&bytes).await;
        }

        self.prepare_body_headers(content_type, length, last_modified, no_cache);
        let header = self.response.access(version, None);
        let head_only = self.is_head();

        let mut writer = ResponseWriter::new(&mut *self.stream, self.config.socket_timeout());
        writer.write(&header).await?;
        if !head_only {
            let sent = writer
                .copy_body(&mut body, Some(length), SEND_CHUNK_SIZE)
                .await?;
            if sent < length {
                self.force_close = true;
            }
        }
        writer.flush().await
    }

    fn prepare_body_headers(
        &mut self,
        content_type: &str,
        length: u64,
        last_modified: Option<&str>,
        no_cache: bool,
    ) {
        self.response
            .initialize(Some(content_type), length, last_modified, no_cache);

        if !no_cache && mime::is_static_asset(content_type) {
            let expires = SystemTime::now() + Duration::from_secs(self.config.static_expires_secs);
            self.response.add("Expires", fmt_http_date(expires));
        }
    }

    async fn send_range(&mut self, path: &Path, header: &str) -> SessionResult<()> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unavailable(path, e))?;
        let total = metadata.len();

        let range = match parse_range(header, total) {
            RangeRequest::Satisfiable(range) => range,
            RangeRequest::Unsatisfiable => return self.send_range_not_satisfiable(total).await,
            RangeRequest::Ignored => return self.send_plain_file(path).await,
        };

        let mut file = File::open(path).await.map_err(|e| unavailable(path, e))?;
        file.seek(SeekFrom::Start(range.start)).await?;

        self.prepare_range_headers(path, &metadata, range);
        let header = self
            .response
            .access(self.request.response_version(), None);
        let head_only = self.is_head();

        let mut writer = ResponseWriter::new(&mut *self.stream, self.config.socket_timeout());
        writer.write(&header).await?;
        if !head_only {
            let sent = writer
                .copy_body(&mut file, Some(range.len()), RANGE_CHUNK_SIZE)
                .await?;
            if sent < range.len() {
                self.force_close = true;
            }
        }
        writer.flush().await
    }

    fn prepare_range_headers(&mut self, path: &Path, metadata: &Metadata, range: ByteRange) {
        self.response.set_status(StatusCode::PartialContent);
        self.response.add("ETag", entity_tag(metadata));
        self.response.add("Accept-Ranges", "bytes");
        self.response.add("Content-Type", mime::content_type_for(path));
        if let Ok(modified) = metadata.modified() {
            self.response.add("Last-Modified", fmt_http_date(modified));
        }
        self.response
            .add("Content-Range", range.content_range(metadata.len()));
        self.response.add("Content-Length", range.len().to_string());
    }

    async fn send_range_not_satisfiable(&mut self, total: u64) -> SessionResult<()> {
        self.response.set_status(StatusCode::RangeNotSatisfiable);
        self.response.add("Content-Range", format!("bytes */{total}"));
        self.response.add("Content-Length", "0");
        let bytes = self
            .response
            .access(self.request.response_version(), None);
        self.write_response(&bytes).await
    }

    async fn send_redirect(&mut self, location: &str) -> SessionResult<()> {
        let location = if location.starts_with('/') {
            format!("{}{}", self.url_root(), location)
        } else {
            location.to_string()
        };

        self.response.set_status(StatusCode::MovedPermanently);
        self.response.add("Location", location);
        self.response.add("Content-Type", "text/html; charset=UTF-8");
        self.response
            .add("Content-Length", REDIRECT_BODY.len().to_string());

        let payload = (!self.is_head()).then_some(REDIRECT_BODY.as_bytes());
        let bytes = self
            .response
            .access(self.request.response_version(), payload);
        self.write_response(&bytes).await
    }

    pub async fn send_not_found(&mut self) -> SessionResult<()> {
        self.send_error(NOT_FOUND_HEAD, NOT_FOUND_BODY, StatusCode::NotFound)
            .await
    }

    /// Sends a small HTML error page.
    pub async fn send_error(
        &mut self,
        html_head: &str,
        html_body: &str,
        status: StatusCode,
    ) -> SessionResult<()> {
        let html = format!("<html><head>{html_head}</head><body>{html_body}</body></html>");

        self.response.set_status(status);
        self.response.add("Content-Length", html.len().to_string());
        self.response.add("Content-Type", "text/html; charset=UTF-8");

        let payload = (!self.is_head()).then_some(html.as_bytes());
        let bytes = self
            .response
            .access(self.request.response_version(), payload);
        self.write_response(&bytes).await
    }

    async fn send_not_modified(&mut self) -> SessionResult<()> {
        self.response.set_info(StatusCode::NotModified, 0);
        let bytes = self
            .response
            .access(self.request.response_version(), None);
        self.write_response(&bytes).await
    }

    async fn send_unavailable(&mut self) -> SessionResult<()> {
        self.response = ResponseHeaders::new(self.config.x_frame_options);
        self.announce_persistence();
        self.response.set_status(StatusCode::ServiceUnavailable);
        self.response.add("Content-Length", "0");
        let bytes = self
            .response
            .access(self.request.response_version(), None);
        self.write_response(&bytes).await
    }

    async fn write_response(&mut self, bytes: &[u8]) -> SessionResult<()> {
        let mut writer = ResponseWriter::new(&mut *self.stream, self.config.socket_timeout());
        writer.write(bytes).await?;
        writer.flush().await
    }

    /// Echoes the connection decision to clients that need to hear it.
    fn announce_persistence(&mut self) {
        if self.force_close || !self.request.keep_alive() {
            self.response.add("Connection", "close");
        } else if self.request.http10 {
            self.response.add("Connection", "keep-alive");
        }
    }

    fn disposition(&self) -> Disposition {
        if self.force_close || self.response.closes_connection() || !self.request.keep_alive() {
            Disposition::Close
        } else {
            Disposition::KeepAlive
        }
    }

    /// Returns `true` when `If-Modified-Since` is not older than the file
    /// time truncated to whole seconds.
    fn not_modified_since(&self, modified: SystemTime) -> bool {
        let Some(value) = self.request.header("If-Modified-Since") else {
            return false;
        };
        let value = value.split(';').next().unwrap_or(value).trim();
        match parse_http_date(value) {
            Ok(since) => truncate_to_seconds(modified) <= since,
            Err(_) => false,
        }
    }

    fn is_head(&self) -> bool {
        self.request.method == Method::HEAD
    }

    fn host(&self) -> String {
        self.request
            .host()
            .map(str::to_owned)
            .unwrap_or_else(|| self.config.domain_name())
    }

    fn url_root(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.host())
    }

    /// Same target on the TLS port.
    fn tls_location(&self) -> String {
        let host = self.host();
        let host = strip_port(&host);
        let port = match self.config.tls_port {
            443 => String::new(),
            port => format!(":{port}"),
        };
        let target = self.request.url.split('#').next().unwrap_or_default();
        format!("https://{host}{port}{target}")
    }

    async fn check_file(&self, path: &str) -> Option<PathBuf> {
        let candidate = self.config.webroot.join(decode_target(path)?);
        if !path.ends_with('/') {
            let found = is_file(&candidate).await;
            return found.then_some(candidate);
        }
        let index = candidate.join("index.html");
        let found = is_file(&index).await;
        found.then_some(index)
    }
}

/// Splits a request target into path and query (query keeps its `?`),
/// dropping any fragment.
pub fn split_target(url: &str) -> (&str, &str) {
    let url = url.split('#').next().unwrap_or_default();
    match url.find('?') {
        Some(pos) => (&url[..pos], &url[pos..]),
        None => (url, ""),
    }
}

/// Percent-decodes a target path into a webroot-relative path using the
/// platform separator. Returns `None` for targets leaving the webroot.
pub fn decode_target(path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let mut relative = PathBuf::new();

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') || Path::new(s).has_root() => return None,
            s => relative.push(s),
        }
    }

    Some(relative)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split(':').next().unwrap_or(host)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn unavailable(path: &Path, e: io::Error) -> SessionError {
    warn!(path = %path.display(), error = %e, "Could not send file");
    SessionError::Unavailable
}

fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

fn entity_tag(metadata: &Metadata) -> String {
    let modified = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_secs());
    format!("\"{:x}-{:x}\"", metadata.len(), modified)
}

async fn discard_body<S>(
    stream: &mut S,
    buffer: &mut ReadBuffer,
    length: u64,
    timeout: Duration,
) -> SessionResult<()>
where
    S: AsyncRead + Unpin,
{
    let buffered = (buffer.len() as u64).min(length);
    buffer.consume(buffered as usize);

    let mut remaining = length - buffered;
    while remaining > 0 {
        if buffer.fill_from(stream, timeout).await? == 0 {
            return Err(SessionError::Closed);
        }
        let take = (buffer.len() as u64).min(remaining);
        buffer.consume(take as usize);
        remaining -= take;
    }

    Ok(())
}
